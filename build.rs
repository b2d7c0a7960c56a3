fn main() {
    // The linker re-invokes this script with arguments when a symbol is missing
    if std::env::args().len() > 1 {
        linker_be_nice();
    }

    // Load .env file for the boot-time LED configuration
    load_env_config();

    // Host builds (unit tests) must not see the ESP linker scripts
    if std::env::var_os("CARGO_FEATURE_ESP32C3").is_none() {
        return;
    }

    println!(
        "cargo:rustc-link-arg=--error-handling-script={}",
        std::env::current_exe().unwrap().display()
    );
    // make sure linkall.x is the last linker script (otherwise might cause problems with flip-link)
    println!("cargo:rustc-link-arg=-Tlinkall.x");
}

/// Load environment configuration from .env file
/// Environment variables take priority over .env file values
fn load_env_config() {
    use std::env;
    use std::path::Path;

    // Tell cargo to rerun this build script if .env file changes
    println!("cargo:rerun-if-changed=.env");

    // Tell cargo to rerun if environment variables change
    println!("cargo:rerun-if-env-changed=BOOT_LED_COLOR");

    // Try to load .env file if it exists
    if Path::new(".env").exists() {
        match dotenvy::dotenv() {
            Ok(_) => println!("cargo:warning=Loaded .env file"),
            Err(e) => println!("cargo:warning=Failed to load .env file: {}", e),
        }
    }

    // Empty values fall back to an all-off strip
    let boot_color = env::var("BOOT_LED_COLOR")
        .unwrap_or_else(|_| String::new())
        .trim()
        .to_string();
    let boot_color = if boot_color.is_empty() {
        String::from("#00000000")
    } else {
        boot_color
    };

    println!("cargo:rustc-env=BOOT_LED_COLOR={}", boot_color);
}

fn linker_be_nice() {
    let args: Vec<String> = std::env::args().collect();
    if args.len() > 1 {
        let kind = &args[1];
        let what = &args[2];

        match kind.as_str() {
            "undefined-symbol" => match what.as_str() {
                "_defmt_timestamp" => {
                    eprintln!();
                    eprintln!("💡 `defmt` not found - make sure `defmt.x` is added as a linker script and you have included `use defmt_rtt as _;`");
                    eprintln!();
                }
                "_stack_start" => {
                    eprintln!();
                    eprintln!("💡 Is the linker script `linkall.x` missing?");
                    eprintln!();
                }
                _ => (),
            },
            // we don't have anything helpful for "missing-lib" yet
            _ => {
                std::process::exit(1);
            }
        }

        std::process::exit(0);
    }
}
