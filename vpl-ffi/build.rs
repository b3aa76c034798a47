//! Build script for `vpl-ffi`: generates the C header with cbindgen.
//!
//! Header generation is best effort. A failure prints a cargo warning and
//! the library still builds.

use std::env;
use std::path::PathBuf;

fn main() {
    println!("cargo:rerun-if-changed=src");

    let crate_dir = match env::var("CARGO_MANIFEST_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(_) => return,
    };
    let out_dir = match env::var("OUT_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(_) => return,
    };

    let mut config = cbindgen::Config::default();
    config.language = cbindgen::Language::C;
    config.include_guard = Some("VPL_FFI_H".to_string());
    config.cpp_compat = true;

    match cbindgen::Builder::new()
        .with_crate(&crate_dir)
        .with_config(config)
        .generate()
    {
        Ok(bindings) => {
            bindings.write_to_file(out_dir.join("vpl_ffi.h"));
        }
        Err(e) => {
            println!("cargo:warning=vpl_ffi.h not generated: {e}");
        }
    }
}
