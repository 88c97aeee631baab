// build.rs
// Compiles the Slang shader into the SPIR-V module the renderer loads at runtime

use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;

const SHADER_SOURCE: &str = "../../shaders/shader.slang";
const SHADER_OUTPUT: &str = "../../shaders/slang.spv";

/// slangc from the Vulkan SDK when VULKAN_SDK is set, otherwise from PATH
fn slang_compiler() -> PathBuf {
    println!("cargo:rerun-if-env-changed=VULKAN_SDK");
    let binary = if cfg!(target_os = "windows") { "slangc.exe" } else { "slangc" };
    match env::var("VULKAN_SDK") {
        Ok(sdk) => {
            let sub_dir = if cfg!(target_os = "windows") { "Bin" } else { "bin" };
            PathBuf::from(sdk).join(sub_dir).join(binary)
        }
        Err(_) => PathBuf::from(binary),
    }
}

fn is_up_to_date(source: &Path, output: &Path) -> bool {
    match (
        std::fs::metadata(source).and_then(|m| m.modified()),
        std::fs::metadata(output).and_then(|m| m.modified()),
    ) {
        (Ok(src), Ok(dst)) => dst >= src,
        _ => false,
    }
}

fn main() {
    println!("cargo:rerun-if-changed={}", SHADER_SOURCE);
    println!("cargo:rerun-if-env-changed=SKIP_SHADERS");

    if env::var("SKIP_SHADERS").is_ok() {
        eprintln!("info: Skipping shader compilation (SKIP_SHADERS set)");
        return;
    }

    let source = Path::new(SHADER_SOURCE);
    let output = Path::new(SHADER_OUTPUT);
    if !source.exists() {
        eprintln!("info: No shader source at {:?}", source);
        return;
    }
    if is_up_to_date(source, output) {
        eprintln!("info: Shader {:?} is up to date", output.file_name().unwrap_or_default());
        return;
    }

    // Prebuilt SPIR-V keeps working when the compiler is unavailable
    let compiler = slang_compiler();
    let status = Command::new(&compiler)
        .arg(source)
        .args(["-target", "spirv", "-profile", "spirv_1_4", "-emit-spirv-directly"])
        .args(["-fvk-use-entrypoint-name", "-entry", "vertMain", "-entry", "fragMain"])
        .arg("-o")
        .arg(output)
        .status();

    match status {
        Ok(s) if s.success() => eprintln!("info: Compiled {:?} -> {:?}", source, output),
        Ok(s) => println!(
            "cargo:warning=slangc failed for {:?} with exit code {}",
            source,
            s.code().unwrap_or(-1)
        ),
        Err(e) => println!("cargo:warning=could not run {:?} ({}); using existing SPIR-V", compiler, e),
    }
}
