//! End-to-end exports with activity-streams fixtures

use std::collections::HashMap;
use std::io::{Cursor, Read, Write};
use std::sync::Arc;

use flate2::Compression;
use flate2::write::GzEncoder;
use powertrack_core::{
    CancelToken, Pipeline, PipelineConfig, PipelineState, RowCodec, ShardSource, StreamError,
};
use powertrack_gnip::{ActivityCodec, ApiConfig, JobManager, PowerTrack};
use serde_json::json;

struct FixtureSource {
    shards: HashMap<String, Vec<u8>>,
}

impl ShardSource for FixtureSource {
    fn open(&self, url: &str) -> Result<Box<dyn Read + Send>, StreamError> {
        match self.shards.get(url) {
            Some(body) => Ok(Box::new(Cursor::new(body.clone()))),
            None => Err(StreamError::Http {
                status: Some(404),
                message: "not found".into(),
            }),
        }
    }
}

fn gzip(lines: &[String]) -> Vec<u8> {
    let mut enc = GzEncoder::new(Vec::new(), Compression::fast());
    for line in lines {
        enc.write_all(line.as_bytes()).unwrap();
        enc.write_all(b"\n").unwrap();
    }
    enc.finish().unwrap()
}

fn located(id: &str, lat: f64, lon: f64) -> String {
    json!({
        "id": id,
        "verb": "post",
        "body": format!("tweet {id}, with comma"),
        "geo": {"type": "Point", "coordinates": [lat, lon]},
        "actor": {"displayName": "A", "followersCount": 1}
    })
    .to_string()
}

fn profile_only(id: &str) -> String {
    json!({
        "id": id,
        "gnip": {"profileLocations": [{"geo": {"type": "point", "coordinates": [-0.1, 51.5]}}]}
    })
    .to_string()
}

fn unlocated(id: &str) -> String {
    json!({"id": id, "body": "no location"}).to_string()
}

#[test]
fn activity_shards_to_csv() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("job.csv");

    let mut shards = HashMap::new();
    shards.insert(
        "https://s3.test/1.json.gz".to_string(),
        gzip(&[
            located("1", 40.4, -3.7),
            unlocated("2"),
            profile_only("3"),
            json!({"info": {"message": "Replay Request Completed", "activity_count": 3}}).to_string(),
        ]),
    );
    shards.insert(
        "https://s3.test/2.json.gz".to_string(),
        gzip(&[located("4", 41.4, 2.1), "{broken".to_string()]),
    );

    let codec = Arc::new(ActivityCodec::new());
    let config = PipelineConfig {
        output: output.clone(),
        workers: 2,
        ..Default::default()
    };
    let summary = Pipeline::new(config, Arc::new(FixtureSource { shards }), codec.clone())
        .run(
            vec![
                "https://s3.test/1.json.gz".to_string(),
                "https://s3.test/2.json.gz".to_string(),
            ],
            &CancelToken::new(),
        )
        .unwrap();

    assert_eq!(summary.state, PipelineState::Done);
    assert_eq!(summary.rows_written, 3);
    assert_eq!(summary.malformed, 1);
    assert_eq!(summary.shards_failed, 0);

    let mut reader = csv::Reader::from_path(&output).unwrap();
    let header: Vec<String> = reader.headers().unwrap().iter().map(String::from).collect();
    assert_eq!(header, codec.header());

    let id_col = header.iter().position(|h| h == "id").unwrap();
    let geom_col = header.iter().position(|h| h == "the_geom").unwrap();
    let body_col = header.iter().position(|h| h == "body").unwrap();

    let mut rows: Vec<Vec<String>> = reader
        .records()
        .map(|r| r.unwrap().iter().map(String::from).collect())
        .collect();
    rows.sort_by(|a, b| a[id_col].cmp(&b[id_col]));

    let ids: Vec<&str> = rows.iter().map(|r| r[id_col].as_str()).collect();
    assert_eq!(ids, vec!["1", "3", "4"]);
    assert_eq!(rows[0][geom_col], r#"{"coordinates":[-3.7,40.4],"type":"Point"}"#);
    assert_eq!(rows[0][body_col], "tweet 1, with comma");
    assert!(rows[1][geom_col].contains("51.5"));
}

#[test]
fn missing_shard_counted_as_failure() {
    let dir = tempfile::tempdir().unwrap();
    let mut shards = HashMap::new();
    shards.insert("a".to_string(), gzip(&[located("1", 1.0, 2.0)]));

    let config = PipelineConfig {
        output: dir.path().join("out.csv"),
        workers: 1,
        ..Default::default()
    };
    let summary = Pipeline::new(
        config,
        Arc::new(FixtureSource { shards }),
        Arc::new(ActivityCodec::new()),
    )
    .run(vec!["a".to_string(), "gone".to_string()], &CancelToken::new())
    .unwrap();

    assert_eq!(summary.state, PipelineState::Done);
    assert_eq!(summary.shards_failed, 1);
    assert_eq!(summary.rows_written, 1);
    assert!(!summary.is_success());
}

/// Needs GNIP_ACCOUNT, GNIP_USERNAME and GNIP_PASSWORD.
#[test]
#[ignore]
fn list_jobs_live() {
    let env = |k: &str| std::env::var(k).unwrap_or_default();
    let config = ApiConfig {
        account: env("GNIP_ACCOUNT"),
        username: env("GNIP_USERNAME"),
        password: env("GNIP_PASSWORD"),
        label: "prod".into(),
        ..Default::default()
    };
    let pt = PowerTrack::new(config, &Default::default()).unwrap();
    let jobs = JobManager::new(&pt).list().unwrap();
    for job in &jobs {
        assert!(job.uuid().is_some());
    }
}
