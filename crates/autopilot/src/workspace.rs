//! Collaborators the tools operate through: a filesystem scoped to a working
//! root and a command runner. The agent never touches the disk or spawns a
//! process except through these traits.
pub mod command;
pub mod fs;

pub use command::{shell_quote, CommandError, CommandOutput, CommandRunner, ShellRunner};
pub use fs::{DirectoryInfo, FileSystem, FsError, LocalFileSystem};
