use camino::Utf8PathBuf;
use ip_harvest::{Harvest, Harvester};
use std::fmt;
use std::io;

/// A log source that can be either a file or stdin.
#[derive(Default, Clone, Debug, PartialEq, Eq)]
pub enum FileOrStdin {
    /// Input from a file.
    File(Utf8PathBuf),
    /// Input from stdin.
    #[default]
    Stdin,
}

impl fmt::Display for FileOrStdin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileOrStdin::File(path) => write!(f, "{}", path),
            FileOrStdin::Stdin => write!(f, "<stdin>"),
        }
    }
}

impl FileOrStdin {
    /// Create a new FileOrStdin from a path.
    ///
    /// If the path is "-", stdin is used.
    pub fn from_path(path: Utf8PathBuf) -> Self {
        if path.as_str() == "-" {
            FileOrStdin::Stdin
        } else {
            FileOrStdin::File(path)
        }
    }

    /// Extract every address from the source.
    ///
    /// Files are checked up front, so a missing, non-regular or empty file is
    /// reported as [`ip_harvest::Error::InputUnavailable`]. Stdin yields
    /// [`ip_harvest::Error::EmptyInput`] when nothing arrives.
    pub fn harvest(&self, harvester: &Harvester) -> ip_harvest::Result<Harvest> {
        match self {
            FileOrStdin::File(path) => harvester.harvest_path(path),
            FileOrStdin::Stdin => harvester.harvest(io::stdin().lock()),
        }
    }
}
