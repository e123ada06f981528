//! Default transfer manager plugin

use super::{
    Adapter, AdapterState, InputAdapter, Lifecycle, OutputAdapter, Pipeline, TransferManager,
    TransferPolicy, TransferResult,
};
use crate::config::ParameterSet;
use crate::error::Result;

use async_trait::async_trait;

pub const DEFAULT_TRANSFER_MANAGER: &str = "DEFAULT_TRANSFER_MANAGER";

const HELP: &str = "Default transfer manager parameters:\n\
    --tp \"stopOnItemError=<true|false>[|partialOnSkip=<true|false>]\"\n\
    stopOnItemError  true aborts the transfer on the first item that fails to \
    transfer; false logs the failure, skips the item and continues (required)\n\
    partialOnSkip    report a partial failure when items were skipped (default false)";

/// Manager that runs a [`Pipeline`] with the configured [`TransferPolicy`]
pub struct DefaultTransferManager {
    lifecycle: Lifecycle,
    policy: TransferPolicy,
}

impl DefaultTransferManager {
    pub fn new() -> Self {
        Self {
            lifecycle: Lifecycle::new(DEFAULT_TRANSFER_MANAGER),
            policy: TransferPolicy::default(),
        }
    }

    pub fn policy(&self) -> TransferPolicy {
        self.policy
    }

    pub fn help_text() -> &'static str {
        HELP
    }
}

impl Default for DefaultTransferManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Adapter for DefaultTransferManager {
    fn name(&self) -> &'static str {
        DEFAULT_TRANSFER_MANAGER
    }

    fn help(&self) -> &'static str {
        HELP
    }

    fn state(&self) -> AdapterState {
        self.lifecycle.state()
    }

    fn close(&mut self) -> Result<()> {
        if self.lifecycle.close() {
            log::debug!("Disposing default transfer manager");
        }
        Ok(())
    }
}

#[async_trait]
impl TransferManager for DefaultTransferManager {
    async fn init(&mut self, config: &ParameterSet) -> Result<()> {
        self.lifecycle.begin_init()?;
        log::debug!("Checking transfer manager parameters");

        let stop_on_item_error = config.require_bool(self.name(), "stopOnItemError")?;
        let partial_on_skip = config
            .bool(self.name(), "partialOnSkip")?
            .unwrap_or(false);
        self.policy = TransferPolicy {
            stop_on_item_error,
            partial_on_skip,
        };

        self.lifecycle.mark_ready();
        log::info!(
            "Transfer manager initialized (stopOnItemError={})",
            stop_on_item_error
        );
        Ok(())
    }

    async fn transfer(
        &mut self,
        input: Box<dyn InputAdapter>,
        output: Box<dyn OutputAdapter>,
    ) -> TransferResult {
        let pipeline = Pipeline::new(input, output).with_policy(self.policy);
        if let Err(e) = self.lifecycle.enter("transfer") {
            return pipeline.abandon(e);
        }
        pipeline.run().await
    }
}
