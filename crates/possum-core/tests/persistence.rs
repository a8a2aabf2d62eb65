mod common;

use common::*;
use possum_core::{
    Config, Database, Message, MessageSender, Possum, Verdict, FINGERPRINTING, USER_URL_DEACTIVATE,
};
use tempfile::TempDir;

fn on_disk(dir: &TempDir) -> Config {
    Config {
        database_path: Some(dir.path().join("data").join("possum.db")),
        ..Config::in_memory()
    }
}

fn detect_script(possum: &Possum) {
    possum.web_request().on_before_request(&main_frame());
    possum.web_request().on_before_request(&script());
    possum.send_message(
        Message::Fingerprinting {
            url: SCRIPT.to_string(),
        },
        to_sender(&main_frame()),
    );
}

#[test]
fn detection_survives_restart() {
    let dir = TempDir::new().unwrap();

    {
        let possum = Possum::open(on_disk(&dir)).unwrap();
        detect_script(&possum);
        possum.flush().unwrap();
    }

    let possum = Possum::open(on_disk(&dir)).unwrap();
    assert_eq!(possum.store().get_url(SCRIPT).unwrap().reason, FINGERPRINTING);

    possum.web_request().on_before_request(&main_frame());
    assert_eq!(
        possum.web_request().on_before_request(&script()),
        Verdict::Cancel
    );
}

#[test]
fn user_deactivation_stays_in_memory() {
    let dir = TempDir::new().unwrap();

    {
        let possum = Possum::open(on_disk(&dir)).unwrap();
        detect_script(&possum);
        possum.send_message(
            Message::UserUrlDeactivate {
                url: SCRIPT.to_string(),
                tab_id: TAB,
            },
            MessageSender::popup(),
        );
        assert_eq!(
            possum.store().get_url(SCRIPT).unwrap().reason,
            USER_URL_DEACTIVATE
        );
        possum.flush().unwrap();
    }

    let possum = Possum::open(on_disk(&dir)).unwrap();
    assert_eq!(possum.store().get_url(SCRIPT).unwrap().reason, FINGERPRINTING);
}

#[test]
fn unset_is_written_through() {
    let dir = TempDir::new().unwrap();

    {
        let possum = Possum::open(on_disk(&dir)).unwrap();
        detect_script(&possum);
        assert!(possum.store().unset_url(SCRIPT).is_some());
        possum.flush().unwrap();
    }

    let possum = Possum::open(on_disk(&dir)).unwrap();
    assert!(possum.save().is_empty());
}

#[test]
fn snapshot_matches_database_rows() {
    let dir = TempDir::new().unwrap();
    let config = on_disk(&dir);
    let path = config.database_path.clone().unwrap();

    let possum = Possum::open(config).unwrap();
    detect_script(&possum);
    possum.flush().unwrap();

    let db = Database::open(&path).unwrap();
    let rows = db.entries().unwrap();
    let snapshot = possum.save();

    assert_eq!(rows.len(), snapshot.len());
    for row in rows {
        assert_eq!(snapshot.entries.get(&row.key), Some(&row.value));
    }
}

#[tokio::test]
async fn flush_async_from_runtime() {
    let dir = TempDir::new().unwrap();

    {
        let possum = Possum::open(on_disk(&dir)).unwrap();
        detect_script(&possum);
        possum.flush_async().await.unwrap();
    }

    let possum = Possum::open(on_disk(&dir)).unwrap();
    assert_eq!(possum.save().len(), 1);
}
