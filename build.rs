use std::path::Path;

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // Only Android builds call into nodejs-mobile
    if std::env::var("CARGO_CFG_TARGET_OS").map(|v| v == "android").unwrap_or(false) {
        link_libnode();
    }
}

/// Map the Rust target architecture onto the Android ABI directory name
/// used by the nodejs-mobile prebuilt archives.
fn android_abi(arch: &str) -> Option<&'static str> {
    match arch {
        "aarch64" => Some("arm64-v8a"),
        "arm" => Some("armeabi-v7a"),
        "x86_64" => Some("x86_64"),
        "x86" => Some("x86"),
        _ => None,
    }
}

/// Emit link directives for `libnode.so`.
/// The library itself is packaged by Gradle from `jniLibs`; here we only need
/// the linker to resolve `node::Start`.
fn link_libnode() {
    println!("cargo:rerun-if-env-changed=NODE_MOBILE_LIB_DIR");

    let arch = std::env::var("CARGO_CFG_TARGET_ARCH").unwrap_or_default();
    let lib_dir = match std::env::var("NODE_MOBILE_LIB_DIR") {
        Ok(dir) => dir,
        Err(_) => match android_abi(&arch) {
            Some(abi) => format!("libnode/bin/{}", abi),
            None => {
                println!("cargo:warning=Unsupported Android architecture {}, set NODE_MOBILE_LIB_DIR", arch);
                return;
            }
        },
    };

    if !Path::new(&lib_dir).exists() {
        println!("cargo:warning=libnode.so directory not found at {}, linking may fail", lib_dir);
    }

    println!("cargo:rustc-link-search=native={}", lib_dir);
    println!("cargo:rustc-link-lib=dylib=node");
}
