//! Terminal output: the live [`TerminalReporter`] and static tables.

pub mod reporter;
pub mod table;
pub mod theme;

pub use reporter::TerminalReporter;
pub use theme::Theme;
