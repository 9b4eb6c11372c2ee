// Copyright (c) 2019-2022 Alibaba Cloud
// Copyright (c) 2019-2022 Ant Group
//
// SPDX-License-Identifier: Apache-2.0
//
#[macro_use]
extern crate slog;

pub mod command;
pub mod fs;

/// Convenience macro to obtain the process-wide scoped logger, installed by
/// the `logging` crate at startup.
#[macro_export]
macro_rules! sl {
    () => {
        slog_scope::logger()
    };
}
