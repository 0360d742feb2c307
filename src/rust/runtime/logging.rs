// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//==============================================================================
// Imports
//==============================================================================

use ::flexi_logger::Logger;
use ::std::sync::Once;

//==============================================================================
// Static Variables
//==============================================================================

/// Guardian to the logging initialize function.
static INIT_LOG: Once = Once::new();

//==============================================================================
// Standalone Functions
//==============================================================================

/// Initializes logging features. The log specification is read from the RUST_LOG environment variable.
///
/// Scheduling decisions are traced from inside the timer interrupt, so verbose levels should only be enabled for
/// debugging: formatting a record allocates.
pub fn initialize() {
    INIT_LOG.call_once(|| match Logger::try_with_env_or_str("warn") {
        Ok(logger) => {
            if let Err(e) = logger.start() {
                eprintln!("initialize(): failed to start logger ({:?})", e);
            }
        },
        Err(e) => eprintln!("initialize(): invalid log specification ({:?})", e),
    });
}
