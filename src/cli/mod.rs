//! Command-line entry points, one per subcommand

pub mod commands;
