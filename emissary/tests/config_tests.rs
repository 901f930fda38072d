#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::path::PathBuf;

use emissary::{ConfigError, Emissary, MailerConfig, QueueConfig, config::from_ron};
use emissary_common::Shutdown;
use emissary_delivery::{
    MailDelivery, MaildirMailer, MalformedPolicy, SendmailMailer, Transaction,
};
use emissary_maildir::Maildir;

#[test]
fn test_path_validation_rejects_parent_dir() {
    let result = QueueConfig::new(PathBuf::from("/var/spool/../etc/passwd"), true);

    assert!(matches!(result, Err(ConfigError::ParentDirectory(_))));
    assert!(
        result
            .unwrap_err()
            .to_string()
            .contains("cannot contain '..'")
    );
}

#[test]
fn test_path_validation_rejects_relative_paths() {
    let result = QueueConfig::new(PathBuf::from("relative/path"), true);

    assert!(result.is_err());
    assert!(result.unwrap_err().to_string().contains("must be absolute"));
}

#[test]
#[cfg(unix)]
fn test_path_validation_rejects_unix_system_directories() {
    let system_paths = vec![
        "/etc/spool",
        "/bin/messages",
        "/sbin/mail",
        "/usr/bin/data",
        "/usr/sbin/queue",
        "/boot/spool",
        "/sys/messages",
        "/proc/mail",
        "/dev/spool",
    ];

    for path in system_paths {
        let result = QueueConfig::new(path, true);

        assert!(result.is_err(), "Path {path} should be rejected but wasn't");
        assert!(
            result.unwrap_err().to_string().contains("system directory"),
            "Wrong error for path {path}"
        );
    }
}

#[test]
#[cfg(unix)]
fn test_path_validation_accepts_valid_unix_paths() {
    let valid_paths = vec![
        "/var/spool/emissary",
        "/home/user/mail",
        "/opt/emissary/queue",
        "/tmp/test-queue",
        "/etcetera/queue",
    ];

    for path in valid_paths {
        let result = QueueConfig::new(path, true);

        assert!(
            result.is_ok(),
            "Valid path {} was rejected: {:?}",
            path,
            result.unwrap_err()
        );
    }
}

#[test]
#[cfg(unix)]
fn test_deserialization_validates_unix_path() {
    let invalid_config = r#"(
        path: "/etc/passwd"
    )"#;

    let result: Result<QueueConfig, _> = ron::from_str(invalid_config);
    assert!(result.is_err());
}

#[test]
#[cfg(unix)]
fn test_deserialization_accepts_valid_unix_path() {
    let valid_config = r#"(
        path: "/var/spool/emissary"
    )"#;

    let result: Result<QueueConfig, _> = ron::from_str(valid_config);
    let queue = result.expect("Valid path rejected during deserialization");
    assert!(queue.create());
}

#[test]
fn test_full_configuration() {
    let emissary: Emissary = from_ron(
        r#"Emissary(
            queue: (path: "/var/spool/emissary", create: false),
            processor: (poll_interval_secs: 10, malformed: Deliver),
            mailer: Sendmail(command: "/usr/lib/sendmail", args: ["-i", "-odq"]),
        )"#,
    )
    .unwrap();

    assert_eq!(emissary.queue().path(), PathBuf::from("/var/spool/emissary"));
    assert!(!emissary.queue().create());
    assert_eq!(emissary.processor().poll_interval_secs, 10);
    assert_eq!(emissary.processor().malformed, MalformedPolicy::Deliver);
    assert_eq!(
        emissary.mailer(),
        &MailerConfig::Sendmail(SendmailMailer::new("/usr/lib/sendmail", ["-i", "-odq"]))
    );
}

#[test]
fn test_minimal_configuration_uses_defaults() {
    let emissary: Emissary = from_ron(r#"(queue: (path: "/var/spool/emissary"))"#).unwrap();

    assert_eq!(emissary.processor().poll_interval_secs, 3);
    assert_eq!(emissary.processor().malformed, MalformedPolicy::Quarantine);
    assert_eq!(emissary.mailer(), &MailerConfig::default());
}

#[test]
fn test_invalid_queue_rejects_whole_configuration() {
    let result: Result<Emissary, _> = from_ron(r#"(queue: (path: "spool"))"#);

    assert!(matches!(result, Err(ConfigError::Parse(_))));
}

#[test]
fn test_load_reports_unreadable_file() {
    let dir = tempfile::tempdir().unwrap();

    let err = Emissary::load(&dir.path().join("missing.ron")).unwrap_err();

    assert!(matches!(err, ConfigError::Read { .. }));
}

#[tokio::test]
async fn test_configured_pipeline_delivers_locally() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("emissary.config.ron");
    std::fs::write(
        &config,
        format!(
            r#"Emissary(
                queue: (path: "{}"),
                mailer: Maildir(path: "{}", create: true),
            )"#,
            dir.path().join("queue").display(),
            dir.path().join("outbox").display(),
        ),
    )
    .unwrap();

    let emissary = Emissary::load(&config).unwrap();
    assert_eq!(
        emissary.mailer(),
        &MailerConfig::Maildir(MaildirMailer::new(dir.path().join("outbox"), true))
    );

    let mut transaction = Transaction::new();
    let id = emissary
        .queued_delivery()
        .send(
            &mut transaction,
            "jim@example.com",
            &["ann@example.com".to_string()],
            "Subject: Hi\n\nbody\n",
        )
        .unwrap();
    transaction.commit().await.unwrap();

    let (_sender, mut shutdown) = Shutdown::channel();
    let report = emissary
        .queue_processor()
        .unwrap()
        .sweep(&mut shutdown)
        .await;
    assert_eq!(report.delivered, 1);
    assert!(emissary.open_queue().unwrap().messages().unwrap().is_empty());

    let outbox = Maildir::open(dir.path().join("outbox"), false).unwrap();
    let delivered = outbox.messages().unwrap();
    assert_eq!(delivered.len(), 1);
    assert_eq!(
        std::fs::read_to_string(&delivered[0]).unwrap(),
        format!("Return-Path: <jim@example.com>\nMessage-Id: <{id}>\nSubject: Hi\n\nbody\n")
    );
}
