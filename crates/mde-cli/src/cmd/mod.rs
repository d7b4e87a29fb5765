pub mod acquire;
pub mod config;
pub mod machine;
pub mod remediate;
