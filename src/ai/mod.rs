// Image generation abstraction layer

pub mod jigsawstack;
pub mod palette;
pub mod prompts;
pub mod provider;

pub use jigsawstack::JigsawStackClient;
pub use provider::*;
