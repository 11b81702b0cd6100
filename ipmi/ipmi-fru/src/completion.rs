// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use core::fmt;

/// IPMI completion code, the first byte of every response.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Completion(pub u8);

/// Internal convenience macro for defining named completion codes
macro_rules! def_completion {
    ($doc:expr, $name:ident, $code:expr) => {
        impl Completion {
            #[doc = $doc]
            pub const $name: Self = Self($code);
        }
    };
}

def_completion!("The command completed normally.", OK, 0x00);

def_completion!(
    "The FRU device is busy; the requested operation cannot be completed at this time.",
    FRU_DEVICE_BUSY,
    0x81
);

def_completion!(
    "The controller is busy and cannot process the command.",
    NODE_BUSY,
    0xC0
);

def_completion!(
    "A processing timeout occurred while executing the command.",
    TIMEOUT,
    0xC3
);

def_completion!(
    "The request data length was invalid.",
    REQUEST_DATA_LENGTH_INVALID,
    0xC7
);

def_completion!(
    "The request data field exceeded its length limit.",
    REQUESTED_DATA_LENGTH_EXCEEDED,
    0xC8
);

def_completion!("A parameter was out of range.", PARAMETER_OUT_OF_RANGE, 0xC9);

def_completion!(
    "The device cannot return the number of requested data bytes.",
    CANNOT_RETURN_REQ_LENGTH,
    0xCA
);

def_completion!("Unspecified error.", UNKNOWN, 0xFF);

impl Completion {
    #[inline]
    pub const fn is_ok(self) -> bool {
        self.0 == 0
    }

    /// Codes that make the read engine retry the same offset with a smaller
    /// chunk. Timeout and the unspecified error are included because some
    /// devices silently drop responses they consider over-large.
    #[inline]
    pub fn triggers_read_backoff(self) -> bool {
        matches!(
            self,
            Self::CANNOT_RETURN_REQ_LENGTH
                | Self::REQUESTED_DATA_LENGTH_EXCEEDED
                | Self::REQUEST_DATA_LENGTH_INVALID
                | Self::TIMEOUT
                | Self::UNKNOWN
        )
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Self::OK => write!(f, "Completion::OK"),
            Self::FRU_DEVICE_BUSY => write!(f, "Completion::FRU_DEVICE_BUSY"),
            Self::NODE_BUSY => write!(f, "Completion::NODE_BUSY"),
            Self::TIMEOUT => write!(f, "Completion::TIMEOUT"),
            Self::REQUEST_DATA_LENGTH_INVALID => {
                write!(f, "Completion::REQUEST_DATA_LENGTH_INVALID")
            }
            Self::REQUESTED_DATA_LENGTH_EXCEEDED => {
                write!(f, "Completion::REQUESTED_DATA_LENGTH_EXCEEDED")
            }
            Self::PARAMETER_OUT_OF_RANGE => write!(f, "Completion::PARAMETER_OUT_OF_RANGE"),
            Self::CANNOT_RETURN_REQ_LENGTH => write!(f, "Completion::CANNOT_RETURN_REQ_LENGTH"),
            Self::UNKNOWN => write!(f, "Completion::UNKNOWN"),
            Self(code) => write!(f, "Completion({code:#04x})"),
        }
    }
}

impl fmt::Display for Completion {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:#04x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_set_test() {
        for code in [
            Completion::CANNOT_RETURN_REQ_LENGTH,
            Completion::REQUESTED_DATA_LENGTH_EXCEEDED,
            Completion::REQUEST_DATA_LENGTH_INVALID,
            Completion::TIMEOUT,
            Completion::UNKNOWN,
        ] {
            assert!(code.triggers_read_backoff());
        }

        for code in [
            Completion::OK,
            Completion::FRU_DEVICE_BUSY,
            Completion::NODE_BUSY,
            Completion::PARAMETER_OUT_OF_RANGE,
            Completion(0xC1),
        ] {
            assert!(!code.triggers_read_backoff());
        }
    }
}
