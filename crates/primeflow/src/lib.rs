#![doc = include_str!("../README.md")]

mod config;
mod demand;
mod error;
mod item;
mod memoizer;
mod oracle;
mod pipeline;
mod policy;
mod publisher;
mod rand;
mod scheduler;
mod subscriber;
mod thread_random;

pub use crate::config::*;
pub use crate::demand::*;
pub use crate::error::*;
pub use crate::item::*;
pub use crate::memoizer::*;
pub use crate::oracle::*;
pub use crate::pipeline::*;
pub use crate::policy::*;
pub use crate::publisher::*;
pub use crate::rand::*;
pub use crate::scheduler::*;
pub use crate::subscriber::*;
pub use crate::thread_random::*;
