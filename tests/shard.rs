//! End-to-end: index a directory tree, reopen the shard and inspect it.

use std::fs;
use std::path::Path;
use tempfile::TempDir;
use trindex::index::build::build_shard;
use trindex::index::stats::disk_usage;
use trindex::index::{
    bytes_to_trigram, Index, IndexConfig, Match, QueryConfig, Section, Writer, SHARD_FILES,
};
use trindex::IndexError;

fn create_source_tree(root: &Path) {
    fs::create_dir_all(root.join("src/util")).unwrap();
    fs::write(
        root.join("src/main.rs"),
        "fn main() {\n    util::greet(\"world\");\n}\n",
    )
    .unwrap();
    fs::write(
        root.join("src/util/mod.rs"),
        "pub fn greet(name: &str) {\n    println!(\"hello {name}\");\n}\n",
    )
    .unwrap();
    fs::write(root.join("README"), "greet the world\n").unwrap();
    fs::write(root.join("logo.png"), [0x89u8, b'P', b'N', b'G', 0xff, 0x00]).unwrap();
    fs::write(root.join("wide.txt"), "x".repeat(5000)).unwrap();
}

#[test]
fn test_add_dir_then_query() {
    let tmp = TempDir::new().unwrap();
    let src = tmp.path().join("tree");
    create_source_tree(&src);

    let shard = tmp.path().join("shard");
    let mut writer = Writer::create(&shard, IndexConfig::default()).unwrap();
    let mut rejected = Vec::new();
    let added = writer
        .add_dir(&src, &src, |path, err| {
            assert!(err.is_rejected(), "{}: {err}", path.display());
            rejected.push(path.file_name().unwrap().to_string_lossy().into_owned());
            Ok(())
        })
        .unwrap();
    writer.flush().unwrap();

    assert_eq!(added, 3);
    rejected.sort();
    assert_eq!(rejected, ["logo.png", "wide.txt"]);

    for name in SHARD_FILES {
        assert!(shard.join(name).is_file(), "missing {name}");
    }

    let index = Index::open(&shard).unwrap();
    let map = index.docid_map().unwrap();
    let names: Vec<&[u8]> = map.all().collect();
    assert_eq!(
        names,
        [&b"README"[..], b"src/main.rs", b"src/util/mod.rs"]
    );

    let greet = index.query_positional("greet").unwrap();
    assert_eq!(
        greet,
        vec![
            Match { docid: 0, position: 0 },
            Match { docid: 1, position: 22 },
            Match { docid: 2, position: 7 },
        ]
    );

    let fn_ = bytes_to_trigram(b'f', b'n', b' ');
    assert_eq!(index.posting_list(fn_).unwrap(), vec![1, 2]);
    assert_eq!(index.deltas(Section::Docid, fn_).unwrap(), vec![1, 2]);

    let report = index.verify().unwrap();
    assert_eq!(report.documents, 3);
    let stats = index.stats().unwrap();
    assert_eq!(stats.trigrams, report.trigrams);
    assert_eq!(stats.pos_entries, report.pos_entries);
}

#[test]
fn test_build_shard_matches_writer() {
    let tmp = TempDir::new().unwrap();
    let src = tmp.path().join("tree");
    create_source_tree(&src);

    let config = IndexConfig {
        chunk_size: 1,
        ..IndexConfig::default()
    };
    let built = tmp.path().join("built");
    let stats = build_shard(&src, &built, &config).unwrap();
    assert_eq!(stats.files, 5);
    assert_eq!(stats.indexed, 3);
    assert_eq!(stats.rejected, 2);

    let index = Index::open(&built).unwrap();
    assert_eq!(
        index.query_positional("hello").unwrap(),
        vec![Match { docid: 2, position: 41 }]
    );
    index.verify().unwrap();

    let all = disk_usage(&built, true).unwrap();
    let docid_only = disk_usage(&built, false).unwrap();
    assert_eq!(all.files.len(), 7);
    assert_eq!(docid_only.files.len(), 3);
    assert!(all.total() > docid_only.total());
}

#[test]
fn test_config_files() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("index.json");
    fs::write(&path, r#"{"max_line_len": 10}"#).unwrap();
    let config = IndexConfig::load(&path).unwrap();
    assert_eq!(config.max_line_len, 10);
    assert_eq!(config.max_text_trigrams, IndexConfig::default().max_text_trigrams);

    let shard = tmp.path().join("shard");
    let mut writer = Writer::create(&shard, config).unwrap();
    assert!(writer.add_bytes("long", b"a line longer than ten").unwrap_err().is_rejected());
    assert_eq!(writer.add_bytes("short", b"short\nlines\n").unwrap(), 0);
    writer.flush().unwrap();

    let path = tmp.path().join("query.json");
    fs::write(&path, r#"{"early_exit": false}"#).unwrap();
    let query = QueryConfig::load(&path).unwrap();
    assert!(!query.early_exit);

    fs::write(&path, "not json").unwrap();
    assert!(matches!(
        QueryConfig::load(&path),
        Err(IndexError::Config { .. })
    ));
}

#[test]
fn test_open_missing_shard() {
    let tmp = TempDir::new().unwrap();
    let err = Index::open(&tmp.path().join("nope")).unwrap_err();
    assert!(matches!(err, IndexError::Io { .. }));
}
