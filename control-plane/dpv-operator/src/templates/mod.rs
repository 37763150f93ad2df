pub mod controller;
pub mod labels;
pub mod manager;
pub mod node_server;

pub use controller::{observed_replicas, render_controller};
pub use manager::*;
pub use node_server::render_node_server;
