//! Transfer orchestration

use super::{InputAdapter, OutputAdapter, TransferResult};
use crate::error::TransferError;

/// Per-item failure policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferPolicy {
    /// Abort on the first item error instead of skipping it
    pub stop_on_item_error: bool,
    /// Report `PartialFailure` when the lenient policy skipped items
    pub partial_on_skip: bool,
}

impl TransferPolicy {
    pub fn stop_on_item_error(stop: bool) -> Self {
        Self {
            stop_on_item_error: stop,
            ..Self::default()
        }
    }
}

impl Default for TransferPolicy {
    fn default() -> Self {
        Self {
            stop_on_item_error: true,
            partial_on_skip: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Initializing,
    Running,
    Completed,
    Failed,
}

/// Why the read/write loop stopped early
enum Halt {
    /// Item error under the stop policy
    Aborted(TransferError),
    /// Error that no policy can skip
    Fatal(TransferError),
}

#[derive(Debug, Default)]
struct Tally {
    transferred: usize,
    skipped: usize,
}

/// Transfer pipeline that drives one input adapter into one output adapter
///
/// The pipeline owns both adapters. They are closed exactly once when
/// [`run`](Pipeline::run) returns, and also when the pipeline is dropped
/// without finishing (unwinding, or the transfer future being cancelled).
///
/// # Example
/// ```no_run
/// use record_transfer::etl::{Pipeline, TransferPolicy};
/// use record_transfer::registry::Registry;
/// use record_transfer::config::parse_parameters;
///
/// # async fn example() -> record_transfer::error::Result<()> {
/// let registry = Registry::builtin();
/// let mut input = registry.resolve_input("CSV_INPUT_PLUGIN")?;
/// input.init(&parse_parameters("filepath=in.csv|separator=,|hasheader=true")?).await?;
/// let mut output = registry.resolve_output("NDJSON_OUTPUT_PLUGIN")?;
/// output.init(&parse_parameters("filepath=out.ndjson")?).await?;
///
/// let result = Pipeline::new(input, output)
///     .with_policy(TransferPolicy::stop_on_item_error(false))
///     .run()
///     .await;
/// println!("{}", result);
/// # Ok(())
/// # }
/// ```
pub struct Pipeline {
    input: Box<dyn InputAdapter>,
    output: Box<dyn OutputAdapter>,
    policy: TransferPolicy,
    state: PipelineState,
    released: bool,
}

impl Pipeline {
    pub fn new(input: Box<dyn InputAdapter>, output: Box<dyn OutputAdapter>) -> Self {
        Self {
            input,
            output,
            policy: TransferPolicy::default(),
            state: PipelineState::Idle,
            released: false,
        }
    }

    pub fn with_policy(mut self, policy: TransferPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Run the transfer to completion
    ///
    /// Steps:
    /// 1. Check both adapters are initialized
    /// 2. Read each record and write it, applying the item policy on failure
    /// 3. Close both adapters
    ///
    /// Never returns an error: every outcome is a [`TransferResult`].
    pub async fn run(mut self) -> TransferResult {
        log::info!(
            "Transfer started: {} -> {}",
            self.input.name(),
            self.output.name()
        );

        let mut tally = Tally::default();
        let outcome = self.drive(&mut tally).await;
        self.release();

        let result = match outcome {
            Ok(()) => {
                self.state = PipelineState::Completed;
                if self.policy.partial_on_skip && tally.skipped > 0 {
                    TransferResult::partial(tally.transferred, tally.skipped)
                } else {
                    TransferResult::success(tally.transferred).with_skipped(tally.skipped)
                }
            }
            Err(Halt::Aborted(cause)) => {
                self.state = PipelineState::Failed;
                TransferResult::failed(cause, tally.transferred).with_skipped(tally.skipped)
            }
            Err(Halt::Fatal(cause)) => {
                self.state = PipelineState::Failed;
                TransferResult::failed(cause, 0)
            }
        };

        match result.is_success() {
            true => log::info!("Items transferred successfully"),
            false => log::warn!("Items not transferred successfully"),
        }
        log::debug!("{}", result);
        result
    }

    /// Give up before running: close both adapters and report `cause`
    pub fn abandon(mut self, cause: TransferError) -> TransferResult {
        log::error!("Transfer abandoned: {}", cause);
        self.release();
        self.state = PipelineState::Failed;
        TransferResult::failed(cause, 0)
    }

    async fn drive(&mut self, tally: &mut Tally) -> Result<(), Halt> {
        self.state = PipelineState::Initializing;
        for (name, state) in [
            (self.input.name(), self.input.state()),
            (self.output.name(), self.output.state()),
        ] {
            if state != super::AdapterState::Ready {
                return Err(Halt::Fatal(TransferError::AdapterState {
                    adapter: name.to_string(),
                    operation: "start a transfer",
                    state,
                }));
            }
        }

        self.state = PipelineState::Running;
        loop {
            log::debug!("Reading next item from {}", self.input.name());
            let record = match self.input.read().await {
                Ok(Some(record)) => record,
                Ok(None) => {
                    log::debug!("{} has no more items", self.input.name());
                    return Ok(());
                }
                Err(e) => {
                    self.on_item_error(e, tally)?;
                    continue;
                }
            };

            log::debug!("Writing item to {}", self.output.name());
            match self.output.write(&record).await {
                Ok(()) => tally.transferred += 1,
                Err(e) => self.on_item_error(e, tally)?,
            }
        }
    }

    fn on_item_error(&self, error: TransferError, tally: &mut Tally) -> Result<(), Halt> {
        if !error.is_item_error() {
            log::error!("Unrecoverable error: {}", error);
            return Err(Halt::Fatal(error));
        }
        if self.policy.stop_on_item_error {
            log::error!("Stopping on item error: {}", error);
            return Err(Halt::Aborted(error));
        }
        log::warn!("Skipping item: {}", error);
        tally.skipped += 1;
        Ok(())
    }

    /// Close both adapters once; a failure on one does not stop the other
    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        log::debug!("Disposing resources");
        if let Err(e) = self.input.close() {
            log::warn!("Failed to close {}: {}", self.input.name(), e);
        }
        if let Err(e) = self.output.close() {
            log::warn!("Failed to close {}: {}", self.output.name(), e);
        }
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::etl::TransferStatus;
    use crate::etl::testing::{Tally, RecordingOutput, VecInput, ids};

    async fn run(
        input: VecInput,
        output: RecordingOutput,
        policy: TransferPolicy,
    ) -> TransferResult {
        Pipeline::new(Box::new(input), Box::new(output))
            .with_policy(policy)
            .run()
            .await
    }

    #[tokio::test]
    async fn test_transfers_every_record() {
        let (input_tally, output_tally) = (Tally::default(), Tally::default());
        let output = RecordingOutput::ready(&output_tally);

        let result = run(
            VecInput::ready(ids(&["r1", "r2", "r3"]), &input_tally),
            output,
            TransferPolicy::default(),
        )
        .await;

        assert_eq!(result.status(), TransferStatus::Success);
        assert_eq!(result.message(), "Success");
        assert_eq!(result.items_transferred(), 3);
        assert_eq!(output_tally.written(), vec!["r1", "r2", "r3"]);
        assert_eq!(input_tally.closes(), 1);
        assert_eq!(output_tally.closes(), 1);
    }

    #[tokio::test]
    async fn test_stop_on_item_error_aborts() {
        let (input_tally, output_tally) = (Tally::default(), Tally::default());
        let result = run(
            VecInput::ready(ids(&["r1", "r2", "r3"]), &input_tally),
            RecordingOutput::ready(&output_tally).failing_on("r2"),
            TransferPolicy::stop_on_item_error(true),
        )
        .await;

        assert_eq!(result.status(), TransferStatus::Failed);
        assert_eq!(result.items_transferred(), 1);
        assert!(result.message().contains("r2"));
        assert_eq!(output_tally.written(), vec!["r1"]);
        assert_eq!(input_tally.closes(), 1);
        assert_eq!(output_tally.closes(), 1);
    }

    #[tokio::test]
    async fn test_lenient_policy_skips_failed_item() {
        let (input_tally, output_tally) = (Tally::default(), Tally::default());
        let result = run(
            VecInput::ready(ids(&["r1", "r2", "r3"]), &input_tally),
            RecordingOutput::ready(&output_tally).failing_on("r2"),
            TransferPolicy::stop_on_item_error(false),
        )
        .await;

        assert_eq!(result.status(), TransferStatus::Success);
        assert_eq!(result.items_transferred(), 2);
        assert_eq!(result.items_skipped(), 1);
        assert_eq!(output_tally.written(), vec!["r1", "r3"]);
        assert_eq!(output_tally.closes(), 1);
    }

    #[tokio::test]
    async fn test_partial_on_skip_reports_partial_failure() {
        let tally = Tally::default();
        let result = run(
            VecInput::ready(ids(&["r1", "r2", "r3"]), &tally),
            RecordingOutput::ready(&tally).failing_on("r3"),
            TransferPolicy {
                stop_on_item_error: false,
                partial_on_skip: true,
            },
        )
        .await;

        assert_eq!(result.status(), TransferStatus::PartialFailure);
        assert_eq!(result.items_transferred(), 2);
        assert_eq!(result.items_skipped(), 1);
    }

    #[tokio::test]
    async fn test_empty_input_succeeds_with_zero() {
        let tally = Tally::default();
        let result = run(
            VecInput::ready(vec![], &tally),
            RecordingOutput::ready(&tally),
            TransferPolicy::default(),
        )
        .await;

        assert_eq!(result.status(), TransferStatus::Success);
        assert_eq!(result.items_transferred(), 0);
        assert_eq!(tally.closes(), 2);
    }

    #[tokio::test]
    async fn test_read_item_error_is_policy_governed() {
        let tally = Tally::default();
        let input = VecInput::ready(ids(&["r1", "r2", "r3"]), &tally).failing_read_at(1);

        let result = run(
            input,
            RecordingOutput::ready(&tally),
            TransferPolicy::stop_on_item_error(false),
        )
        .await;

        assert_eq!(result.items_transferred(), 2);
        assert_eq!(tally.written(), vec!["r1", "r3"]);
    }

    #[tokio::test]
    async fn test_fatal_error_ignores_lenient_policy() {
        let tally = Tally::default();
        let result = run(
            VecInput::ready(ids(&["r1", "r2", "r3"]), &tally),
            RecordingOutput::ready(&tally).fatal_on("r2"),
            TransferPolicy::stop_on_item_error(false),
        )
        .await;

        assert_eq!(result.status(), TransferStatus::Failed);
        assert_eq!(result.items_transferred(), 0);
        assert!(result.message().contains("invalid mapping"));
        assert_eq!(tally.closes(), 2);
    }

    #[tokio::test]
    async fn test_uninitialized_adapter_fails_before_reading() {
        let tally = Tally::default();
        let result = run(
            VecInput::uninitialized(ids(&["r1"]), &tally),
            RecordingOutput::ready(&tally),
            TransferPolicy::default(),
        )
        .await;

        assert_eq!(result.status(), TransferStatus::Failed);
        assert_eq!(result.items_transferred(), 0);
        assert!(result.message().contains("uninitialized"));
        assert!(tally.written().is_empty());
        assert_eq!(tally.closes(), 2);
    }

    #[tokio::test]
    async fn test_close_failure_does_not_block_sibling() {
        let (input_tally, output_tally) = (Tally::default(), Tally::default());
        let result = run(
            VecInput::ready(ids(&["r1"]), &input_tally).failing_close(),
            RecordingOutput::ready(&output_tally),
            TransferPolicy::default(),
        )
        .await;

        assert!(result.is_success());
        assert_eq!(input_tally.closes(), 1);
        assert_eq!(output_tally.closes(), 1);
    }

    #[test]
    fn test_drop_releases_adapters() {
        let tally = Tally::default();
        let pipeline = Pipeline::new(
            Box::new(VecInput::ready(ids(&["r1"]), &tally)),
            Box::new(RecordingOutput::ready(&tally)),
        );
        assert_eq!(pipeline.state(), PipelineState::Idle);
        drop(pipeline);
        assert_eq!(tally.closes(), 2);
    }

    #[test]
    fn test_abandon_releases_and_fails() {
        let tally = Tally::default();
        let result = Pipeline::new(
            Box::new(VecInput::ready(ids(&["r1"]), &tally)),
            Box::new(RecordingOutput::ready(&tally)),
        )
        .abandon(TransferError::item("manager not initialized"));

        assert_eq!(result.status(), TransferStatus::Failed);
        assert_eq!(tally.closes(), 2);
    }
}
