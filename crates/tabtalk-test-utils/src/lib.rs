// SPDX-FileCopyrightText: 2026 Tabtalk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for tabtalk integration tests.

pub mod mock_dispatcher;

pub use mock_dispatcher::{MockDispatcher, failing_dispatch, ok_dispatch};
