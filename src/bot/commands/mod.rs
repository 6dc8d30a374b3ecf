//! Discord command implementations organized by category.

/// Seller campaign commands
pub mod campaigns;

/// Seller credit commands
pub mod credits;

/// General utility commands
pub mod general;

/// Customer subscription commands
pub mod subscriptions;

// Export commands
pub use campaigns::*;
pub use credits::*;
pub use general::*;
pub use subscriptions::*;
