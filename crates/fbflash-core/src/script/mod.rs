//! Flash script language: command types and parser.

pub mod command;
pub mod parse;

pub use command::{Command, PartitionSlot};
pub use parse::{SCRIPT_NAME, ScriptError, entry_name_prefix, find_script_entry, parse_script};
