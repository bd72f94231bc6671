pub mod config;
pub mod errors;
pub mod observation;
pub mod result;
pub mod space;

pub use config::*;
pub use errors::*;
pub use observation::*;
pub use result::*;
pub use space::*;
