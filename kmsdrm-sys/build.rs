use env::VarError;
use std::env;
use std::path::PathBuf;

fn main() {
    // Consider 'KMSDRM_INCLUDE_DIR' and 'KMSDRM_LIB_DIR', if pkg-config should not be used.
    // The FFI surface below is hand-declared from the stable DRM uapi and the
    // small slice of libdrm's C API this backend calls, so unlike a
    // bindgen-generated crate this build script only needs to emit link
    // flags, not produce a generated bindings file.
    env::var("KMSDRM_INCLUDE_DIR")
        .map(|value| {
            let include_dir = PathBuf::from(value.as_str());
            if !include_dir.is_dir() {
                panic!(
                    "The specified include directory '{}' in KMSDRM_INCLUDE_DIR is not valid.",
                    value
                );
            }

            let lib_dir = env::var("KMSDRM_LIB_DIR")
                .and_then(|lib_dir| match PathBuf::from(lib_dir) {
                    lib_dir if lib_dir.is_dir() => Ok(lib_dir),
                    _ => Err(VarError::NotPresent),
                })
                .expect("KMSDRM_LIB_DIR is not set or the specified directory is not valid.");

            println!("cargo:rustc-link-lib=dylib=drm");
            println!("cargo:rustc-link-search=native={}", lib_dir.to_string_lossy());
        })
        .unwrap_or_else(|_| {
            pkg_config::probe_library("libdrm").expect(
                "Unable to query libdrm using pkg-config. Consider setting the environment \
                 variables KMSDRM_INCLUDE_DIR and KMSDRM_LIB_DIR explicitly.",
            );
        });
}
