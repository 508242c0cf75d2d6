pub mod aggregate;
pub mod macros;
pub mod observation;
pub mod time;
pub mod users;

pub use aggregate::*;
pub use observation::*;
pub use time::*;
pub use users::*;
