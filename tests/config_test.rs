//! Environment layering in `Config::load`
//!
//! Kept in its own test binary: environment variables are process-wide.

use std::path::PathBuf;

use camstream::Config;

#[test]
fn environment_overrides_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("camstream.toml");
    std::fs::write(
        &path,
        "[http]\nport = 9100\n\n[output]\nframe_fps = 4\nframe_dir = \"/srv/frames\"\n",
    )
    .unwrap();

    std::env::set_var("CAMSTREAM_HTTP__PORT", "9200");
    std::env::set_var("CAMSTREAM_OUTPUT__FRAME_FPS", "2");
    let config = Config::load(Some(&path));
    std::env::remove_var("CAMSTREAM_HTTP__PORT");
    std::env::remove_var("CAMSTREAM_OUTPUT__FRAME_FPS");

    let config = config.unwrap();
    assert_eq!(config.http.port, 9200);
    assert_eq!(config.output.frame_fps, 2);
    // untouched by the environment
    assert_eq!(config.output.frame_dir, PathBuf::from("/srv/frames"));
    assert_eq!(config.capture.fps, 10);
}
