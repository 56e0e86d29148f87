pub use crate::error::{Error, Result};
pub use crate::unit::{Entry, Section, UnitFile};
