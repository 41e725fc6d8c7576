//! Integration tests for loading configuration files from disk.

use std::io::Write;

use framepace_core::{Error, RendererConfig};

fn write_temp(name: &str, contents: &str) -> std::path::PathBuf {
    let path = std::env::temp_dir().join(format!(
        "framepace-{}-{}.toml",
        name,
        std::process::id()
    ));
    let mut file = std::fs::File::create(&path).expect("create temp config");
    file.write_all(contents.as_bytes()).expect("write temp config");
    path
}

#[test]
fn test_load_full_file() {
    let path = write_temp(
        "full",
        r#"
        [window]
        width = 1024
        height = 768
        title = "pacing"

        [vulkan]
        validation = true

        [run]
        max_frames = 120

        [logging]
        filter = "debug"
        "#,
    );

    let config = RendererConfig::load(&path).expect("valid config");
    std::fs::remove_file(&path).ok();

    assert_eq!(config.window.width, 1024);
    assert_eq!(config.window.height, 768);
    assert_eq!(config.window.title, "pacing");
    assert!(config.vulkan.validation);
    assert_eq!(config.run.max_frames, Some(120));
    assert_eq!(config.logging.filter, "debug");
}

#[test]
fn test_load_reports_path_on_bad_contents() {
    let path = write_temp("bad", "[window\nwidth = 3");
    let err = RendererConfig::load(&path).unwrap_err();
    std::fs::remove_file(&path).ok();

    match err {
        Error::Config(message) => assert!(message.contains("framepace-bad")),
        other => panic!("unexpected error: {:?}", other),
    }
}
