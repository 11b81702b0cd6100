// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

/// Returns early with `$otherwise` (or `()`) unless `$cond` holds.
macro_rules! ensure {
    ($cond:expr) => {
        ensure!($cond, ())
    };
    ($cond:expr, $otherwise:expr) => {
        if !($cond) {
            return $otherwise;
        }
    };
}
