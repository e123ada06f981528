//! Integration tests for end-to-end transfers
//!
//! These tests drive the CLI helpers with real files, SQLite databases and
//! maildirs inside temporary directories.

use async_trait::async_trait;
use eyre::Result;
use record_transfer::cli::{resolve_job, run_transfer};
use record_transfer::config::{ENV_INPUT, ENV_MANAGER, PluginSelection, TransferJob};
use record_transfer::etl::{AdapterState, DEFAULT_TRANSFER_MANAGER, Lifecycle};
use record_transfer::registry::{PluginDescriptor, Registry};
use record_transfer::{
    Adapter, InputAdapter, ParameterSet, Record, TransferError, TransferStatus, Value,
};
use serial_test::serial;
use std::path::Path;
use tempfile::TempDir;

fn job(manager: &str, input: (&str, String), output: (&str, String)) -> TransferJob {
    TransferJob::new(
        PluginSelection::new(DEFAULT_TRANSFER_MANAGER, manager),
        PluginSelection::new(input.0, input.1),
        PluginSelection::new(output.0, output.1),
    )
}

fn read_lines(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}

#[tokio::test]
async fn test_csv_to_sqlite_to_ndjson() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let csv = temp_dir.path().join("people.csv");
    let db = temp_dir.path().join("people.db");
    let ndjson = temp_dir.path().join("people.ndjson");
    std::fs::write(
        &csv,
        "First Name;Mail;Ignored\nAda;ada@example.com;x\nAlan;alan@example.com;y\nGrace;grace@example.com;z\n",
    )?;

    let first = run_transfer(
        Registry::builtin(),
        &job(
            "stopOnItemError=true",
            (
                "CSV_INPUT_PLUGIN",
                format!(
                    "filepath={}|separator=;|hasheader=true|mapping=First Name:name~Mail:email",
                    csv.display()
                ),
            ),
            (
                "SQLITE_OUTPUT_PLUGIN",
                format!(
                    "connectionstring={}|table=contacts|createtable=true|mapping=contact_name:name~contact_email:email",
                    db.display()
                ),
            ),
        ),
    )
    .await?;
    assert_eq!(first.status(), TransferStatus::Success);
    assert_eq!(first.items_transferred(), 3);

    let second = run_transfer(
        Registry::builtin(),
        &job(
            "stopOnItemError=true",
            (
                "SQLITE_INPUT_PLUGIN",
                format!(
                    "connectionstring={}|table=contacts|batchsize=2|mapping=contact_name:name~contact_email:email",
                    db.display()
                ),
            ),
            ("NDJSON_OUTPUT_PLUGIN", format!("filepath={}", ndjson.display())),
        ),
    )
    .await?;
    assert_eq!(second.items_transferred(), 3);

    assert_eq!(
        read_lines(&ndjson),
        vec![
            r#"{"name":"Ada","email":"ada@example.com"}"#,
            r#"{"name":"Alan","email":"alan@example.com"}"#,
            r#"{"name":"Grace","email":"grace@example.com"}"#,
        ]
    );
    Ok(())
}

#[tokio::test]
async fn test_item_error_policies() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let input = temp_dir.path().join("in.ndjson");
    let output = temp_dir.path().join("out.csv");
    std::fs::write(&input, "{\"id\":1}\n{broken\n{\"id\":3}\n")?;

    let selections = |manager: &str| {
        job(
            manager,
            ("NDJSON_INPUT_PLUGIN", format!("filepath={}", input.display())),
            (
                "CSV_OUTPUT_PLUGIN",
                format!(
                    "filepath={}|separator=,|hasheader=false|mapping=id:id",
                    output.display()
                ),
            ),
        )
    };

    let stopped = run_transfer(Registry::builtin(), &selections("stopOnItemError=true")).await?;
    assert_eq!(stopped.status(), TransferStatus::Failed);
    assert_eq!(stopped.items_transferred(), 1);
    assert!(stopped.message().starts_with("Transfer not completed"));
    assert_eq!(read_lines(&output), vec!["1"]);

    let lenient = run_transfer(
        Registry::builtin(),
        &selections("stopOnItemError=false|partialOnSkip=true"),
    )
    .await?;
    assert_eq!(lenient.status(), TransferStatus::PartialFailure);
    assert_eq!(lenient.items_transferred(), 2);
    assert_eq!(lenient.items_skipped(), 1);
    assert_eq!(read_lines(&output), vec!["1", "1", "3"]);
    Ok(())
}

#[tokio::test]
async fn test_configuration_errors_happen_before_any_transfer() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let csv = temp_dir.path().join("in.csv");
    let out = temp_dir.path().join("out.ndjson");
    std::fs::write(&csv, "a,b\n1,2\n")?;

    let bad_mapping = job(
        "stopOnItemError=true",
        (
            "CSV_INPUT_PLUGIN",
            format!(
                "filepath={}|separator=,|hasheader=true|mapping=missing:field",
                csv.display()
            ),
        ),
        ("NDJSON_OUTPUT_PLUGIN", format!("filepath={}", out.display())),
    );
    let err = run_transfer(Registry::builtin(), &bad_mapping)
        .await
        .unwrap_err();
    assert!(matches!(
        err.root_cause().downcast_ref::<TransferError>(),
        Some(TransferError::InvalidMapping(_))
    ));
    assert!(!out.exists());

    let malformed = job(
        "stopOnItemError=true",
        ("CSV_INPUT_PLUGIN", "filepath".to_string()),
        ("NDJSON_OUTPUT_PLUGIN", format!("filepath={}", out.display())),
    );
    let err = run_transfer(Registry::builtin(), &malformed)
        .await
        .unwrap_err();
    assert!(format!("{:#}", err).contains("missing '='"));

    let manager = job(
        "",
        (
            "CSV_INPUT_PLUGIN",
            format!("filepath={}|separator=,|hasheader=true", csv.display()),
        ),
        ("NDJSON_OUTPUT_PLUGIN", format!("filepath={}", out.display())),
    );
    assert!(run_transfer(Registry::builtin(), &manager).await.is_err());
    Ok(())
}

#[tokio::test]
async fn test_maildir_to_csv() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let maildir = temp_dir.path().join("Maildir");
    for sub in ["tmp", "new", "cur"] {
        std::fs::create_dir_all(maildir.join(sub))?;
    }
    std::fs::write(
        maildir.join("new/100.1.host"),
        "Subject: Signup\n\nName: Ada\nEmail: ada@example.com\n",
    )?;
    std::fs::write(
        maildir.join("new/200.1.host"),
        "Subject: Spam\n\nName: Nobody\nEmail: no@example.com\n",
    )?;
    let csv = temp_dir.path().join("signups.csv");

    let result = run_transfer(
        Registry::builtin(),
        &job(
            "stopOnItemError=true",
            (
                "MAILDIR_INPUT_PLUGIN",
                format!(
                    "maildir={}|subject=Signup|mapping=Name:name~Email:email",
                    maildir.display()
                ),
            ),
            (
                "CSV_OUTPUT_PLUGIN",
                format!(
                    "filepath={}|separator=,|hasheader=true|mapping=NAME:name~EMAIL:email",
                    csv.display()
                ),
            ),
        ),
    )
    .await?;

    assert!(result.is_success());
    assert_eq!(read_lines(&csv), vec!["NAME,EMAIL", "Ada,ada@example.com"]);
    assert!(maildir.join("new/200.1.host").exists());
    Ok(())
}

/// Input plugin defined outside the crate
struct CountdownInput {
    lifecycle: Lifecycle,
    remaining: i64,
}

impl Adapter for CountdownInput {
    fn name(&self) -> &'static str {
        "COUNTDOWN_INPUT_PLUGIN"
    }

    fn help(&self) -> &'static str {
        "--ip \"from=<count>\""
    }

    fn state(&self) -> AdapterState {
        self.lifecycle.state()
    }

    fn close(&mut self) -> record_transfer::Result<()> {
        self.lifecycle.close();
        Ok(())
    }
}

#[async_trait]
impl InputAdapter for CountdownInput {
    async fn init(&mut self, config: &ParameterSet) -> record_transfer::Result<()> {
        self.lifecycle.begin_init()?;
        self.remaining = config
            .require(self.name(), "from")?
            .parse()
            .map_err(|_| TransferError::init(self.name(), "from must be a number"))?;
        self.lifecycle.mark_ready();
        Ok(())
    }

    async fn read(&mut self) -> record_transfer::Result<Option<Record>> {
        self.lifecycle.enter("read")?;
        if self.remaining == 0 {
            return Ok(None);
        }
        let mut record = Record::new();
        record.insert("n", self.remaining);
        self.remaining -= 1;
        Ok(Some(record))
    }
}

#[tokio::test]
async fn test_custom_plugin_registration() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let out = temp_dir.path().join("countdown.ndjson");

    let mut registry = Registry::with_builtins();
    registry.register(PluginDescriptor::input(
        "COUNTDOWN_INPUT_PLUGIN",
        "--ip \"from=<count>\"",
        || {
            Box::new(CountdownInput {
                lifecycle: Lifecycle::new("COUNTDOWN_INPUT_PLUGIN"),
                remaining: 0,
            })
        },
    ))?;

    let result = run_transfer(
        &registry,
        &job(
            "stopOnItemError=true",
            ("COUNTDOWN_INPUT_PLUGIN", "from=3".to_string()),
            ("NDJSON_OUTPUT_PLUGIN", format!("filepath={}", out.display())),
        ),
    )
    .await?;
    assert_eq!(result.items_transferred(), 3);
    assert_eq!(read_lines(&out), vec![r#"{"n":3}"#, r#"{"n":2}"#, r#"{"n":1}"#]);

    assert!(!Registry::builtin().is_registered(
        record_transfer::Capability::Input,
        "COUNTDOWN_INPUT_PLUGIN"
    ));
    Ok(())
}

#[test]
#[serial]
fn test_job_precedence() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let job_file = temp_dir.path().join("job.yml");
    std::fs::write(
        &job_file,
        "input:\n  name: NDJSON_INPUT_PLUGIN\n  parameters: filepath=from-file.ndjson\noutput:\n  name: CSV_OUTPUT_PLUGIN\n",
    )?;

    // SAFETY: serialized with every other test touching the environment
    unsafe {
        std::env::set_var(ENV_MANAGER, DEFAULT_TRANSFER_MANAGER);
        std::env::set_var(ENV_INPUT, "CSV_INPUT_PLUGIN");
    }

    let flags = TransferJob::new(
        PluginSelection::default(),
        PluginSelection::new("", "filepath=from-flags.ndjson"),
        PluginSelection::new("SQLITE_OUTPUT_PLUGIN", ""),
    );
    let job = resolve_job(flags, job_file.to_str());

    unsafe {
        std::env::remove_var(ENV_MANAGER);
        std::env::remove_var(ENV_INPUT);
    }

    let job = job?;
    assert_eq!(job.manager.name, DEFAULT_TRANSFER_MANAGER);
    assert_eq!(job.input.name, "NDJSON_INPUT_PLUGIN");
    assert_eq!(job.input.parameters, "filepath=from-flags.ndjson");
    assert_eq!(job.output.name, "SQLITE_OUTPUT_PLUGIN");
    assert!(job.blank_selections().is_empty());
    Ok(())
}

#[test]
fn test_value_text_round_trip_through_record() {
    let record: Record = [("a", Value::from(1i64)), ("b", Value::Null)]
        .into_iter()
        .collect();
    assert_eq!(record.to_json().to_string(), r#"{"a":1,"b":null}"#);
}
