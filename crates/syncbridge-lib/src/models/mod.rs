// Data models module
// Integration, webhook, activity and pipeline types shared by every service

pub mod activity;
pub mod delivery;
pub mod integration;
pub mod pipeline;
pub mod webhook;

pub use activity::*;
pub use delivery::*;
pub use integration::*;
pub use pipeline::*;
pub use webhook::*;
