// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::completion::Completion;
use core::{fmt, panic::Location};

pub type Result<T, E = Error> = core::result::Result<T, E>;

#[derive(Clone, Copy)]
pub struct Error {
    kind: Kind,
    location: &'static Location<'static>,
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Error")
            .field("kind", &self.kind)
            .field("crate", &"ipmi-fru")
            .field("file", &self.file())
            .field("line", &self.location.line())
            .finish()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let Self { kind, location } = self;
        let file = self.file();
        let line = location.line();
        write!(f, "[ipmi-fru::{file}:{line}]: {kind}")
    }
}

impl std::error::Error for Error {}

impl Error {
    #[track_caller]
    #[inline]
    pub fn new(kind: Kind) -> Self {
        Self {
            kind,
            location: Location::caller(),
        }
    }

    #[inline]
    pub fn kind(&self) -> Kind {
        self.kind
    }

    /// The completion code the device returned, for transport-level errors.
    #[inline]
    pub fn completion(&self) -> Option<Completion> {
        match self.kind {
            Kind::Completion { code } => Some(code),
            _ => None,
        }
    }

    #[inline]
    fn file(&self) -> &'static str {
        self.location
            .file()
            .trim_start_matches(concat!(env!("CARGO_MANIFEST_DIR"), "/src/"))
    }
}

impl From<Kind> for Error {
    #[track_caller]
    #[inline]
    fn from(kind: Kind) -> Self {
        Self::new(kind)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Kind {
    #[error("the device returned completion code {code}")]
    Completion { code: Completion },
    #[error("the response was truncated or malformed")]
    Invalid,
    #[error("the device advertised an inventory area smaller than the FRU header")]
    AreaTooSmall,
    #[error("the inventory buffer could not be allocated")]
    OutOfMemory,
    #[error("the operation was cancelled by object destruction")]
    Cancelled,
    #[error("no registered decoder recognizes the inventory format")]
    UnsupportedFormat,
    #[error("the operation does not match how the object is tracked")]
    PermissionDenied,
    #[error("another operation is in progress on the object")]
    Busy,
    #[error("not implemented for this device class")]
    NotSupported,
}

impl Kind {
    #[inline]
    #[track_caller]
    pub(crate) fn err(self) -> Error {
        Error::new(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_accessor_test() {
        let error = Kind::Completion {
            code: Completion::TIMEOUT,
        }
        .err();
        assert_eq!(error.completion(), Some(Completion::TIMEOUT));
        assert_eq!(Kind::Busy.err().completion(), None);
    }
}
