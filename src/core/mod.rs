//! Core engine operations, independent of the chat surface.
//!
//! Every operation takes a database connection and returns [`crate::errors::Result`].
//! Operations that touch more than one row run inside a single database
//! transaction; shared counters are only moved with atomic `col = col + n`
//! updates.

pub mod campaign;
pub mod clicks;
pub mod fanout;
pub mod ledger;
pub mod queue;
pub mod registry;
pub mod shop;
