use std::env;

fn main() {
    println!("cargo:rerun-if-env-changed=FFMPEG_DIR");

    // Only the FFmpeg frame source links native libraries, and only Windows
    // lacks a pkg-config fallback for finding them.
    let ffmpeg_enabled = env::var_os("CARGO_FEATURE_FFMPEG").is_some();
    let windows = env::var("CARGO_CFG_TARGET_OS").is_ok_and(|os| os == "windows");
    if ffmpeg_enabled && windows && env::var_os("FFMPEG_DIR").is_none() {
        println!(
            "cargo:warning=FFMPEG_DIR is not set; point it at an FFmpeg install (e.g. vcpkg's installed/x64-windows) or build with --no-default-features."
        );
    }
}
