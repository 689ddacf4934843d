use std::env;
use std::path::PathBuf;

fn main() {
    // The CH341 vendor library is only linked on Windows; Linux talks to the
    // bus through /dev/i2c and needs no vendor code.
    if env::var("CARGO_CFG_TARGET_OS").as_deref() != Ok("windows") {
        return;
    }

    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());

    // Default to the vendor SDK checkout next to the project.
    // CH341_SDK_DIR overrides, pointing at the directory holding CH341DLLA64.LIB.
    let sdk_lib_path = match env::var("CH341_SDK_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(_) => manifest_dir
            .parent()
            .unwrap_or(&manifest_dir)
            .join("CH341PAR")
            .join("LIB")
            .join("AMD64"),
    };

    println!("cargo:rustc-link-search=native={}", sdk_lib_path.display());

    // CH341DLLA64.dll is resolved at runtime; only the import library is
    // needed at link time.
    println!("cargo:rustc-link-lib=dylib=CH341DLLA64");

    println!("cargo:rerun-if-env-changed=CH341_SDK_DIR");
}
