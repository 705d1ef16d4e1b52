// SPDX-License-Identifier: MIT

//! Engine configuration: endpoints, systems and scheduled functions

mod loader;
mod types;

pub use loader::ConfigStore;
pub use types::*;
