// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Portable network protocol components layered on an external TCP/IP
//! stack socket driver.

pub mod dns;
pub mod link;
pub mod test_helpers;
