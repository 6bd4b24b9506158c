mod support;

use std::path::PathBuf;

use camflow::Lut3d;

use support::{encode_png, temp_dir};

fn exe() -> PathBuf {
    std::env::var_os("CARGO_BIN_EXE_camflow")
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            let mut p = PathBuf::from("target").join("debug");
            p.push(if cfg!(windows) {
                "camflow.exe"
            } else {
                "camflow"
            });
            p
        })
}

fn fixture(name: &str) -> PathBuf {
    let dir = temp_dir(name);
    std::fs::create_dir_all(dir.join("luts")).unwrap();
    let lut = Lut3d::identity(4).unwrap();
    std::fs::write(dir.join("luts/default.png"), encode_png(&lut.to_strip_image())).unwrap();
    let img = image::RgbaImage::from_pixel(8, 4, image::Rgba([30, 60, 90, 255]));
    std::fs::write(dir.join("in.png"), encode_png(&img)).unwrap();
    dir
}

#[test]
fn cli_frame_writes_rotated_png() {
    let dir = fixture("cli_frame");
    let out_path = dir.join("out.png");

    let status = std::process::Command::new(exe())
        .args(["frame", "--mode", "lut-grade", "--orientation", "90", "--in"])
        .arg(dir.join("in.png"))
        .arg("--assets")
        .arg(&dir)
        .arg("--out")
        .arg(&out_path)
        .status()
        .unwrap();

    assert!(status.success());
    let out = image::open(&out_path).unwrap().to_rgba8();
    assert_eq!(out.dimensions(), (4, 8));
}

#[test]
fn cli_loop_prints_stats() {
    let dir = fixture("cli_loop");
    let config = dir.join("opts.json");
    std::fs::write(&config, r#"{ "frame_interval_ms": 0 }"#).unwrap();

    let output = std::process::Command::new(exe())
        .args(["loop", "--frames", "3", "--in"])
        .arg(dir.join("in.png"))
        .arg("--assets")
        .arg(&dir)
        .arg("--config")
        .arg(&config)
        .output()
        .unwrap();

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let stats: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(stats["loops_started"], 1);
    assert!(stats["frames_presented"].as_u64().unwrap() >= 3);
}

#[test]
fn cli_fails_cleanly_without_lut() {
    let dir = temp_dir("cli_no_lut");
    std::fs::create_dir_all(&dir).unwrap();
    let img = image::RgbaImage::from_pixel(2, 2, image::Rgba([0, 0, 0, 255]));
    std::fs::write(dir.join("in.png"), encode_png(&img)).unwrap();

    let status = std::process::Command::new(exe())
        .args(["frame", "--in"])
        .arg(dir.join("in.png"))
        .arg("--assets")
        .arg(&dir)
        .arg("--out")
        .arg(dir.join("out.png"))
        .status()
        .unwrap();
    assert!(!status.success());
}
