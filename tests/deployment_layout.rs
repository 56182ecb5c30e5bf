//! Checks on the container build, compose file, env template and test runner

use std::path::{Path, PathBuf};

fn repo_file(name: &str) -> String {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join(name);
    std::fs::read_to_string(&path).unwrap_or_else(|e| panic!("{}: {}", path.display(), e))
}

#[test]
fn test_dockerfile_contract() {
    let dockerfile = repo_file("Dockerfile");

    assert_eq!(dockerfile.lines().filter(|l| l.starts_with("FROM ")).count(), 2);
    for arg in ["ARG RUN_TESTS", "ARG TESTS_STRICT", "ARG EXTRA_RUNTIME_PACKAGES"] {
        assert!(dockerfile.contains(arg), "missing {}", arg);
    }
    for package in ["tesseract-ocr", "poppler-utils", "libpq5"] {
        assert!(dockerfile.contains(package), "missing runtime package {}", package);
    }
    assert!(dockerfile.contains("EXPOSE 8501"));
    assert!(dockerfile.contains("--interval=30s --timeout=10s --start-period=40s --retries=3"));
    assert!(dockerfile.contains("http://localhost:8501/health"));
    assert!(dockerfile.contains("COPY --from=builder"));
    for dir in ["HF_HOME", "laws_db_chroma", "procedures_db_chroma"] {
        assert!(dockerfile.contains(dir), "missing writable dir {}", dir);
    }
}

#[test]
fn test_env_example_documents_every_variable() {
    let env = repo_file(".env.example");
    for var in [
        "OPENAI_API_KEY",
        "AZURE_POSTGRES_HOST",
        "AZURE_POSTGRES_DB",
        "AZURE_POSTGRES_USER",
        "AZURE_POSTGRES_PASSWORD",
        "AZURE_POSTGRES_PORT",
        "AZURE_POSTGRES_SSLMODE",
        "LAWS_CHROMA_SAS_URL",
        "PROCS_CHROMA_SAS_URL",
        "REDIS_HOST",
        "REDIS_PORT",
        "REDIS_PASSWORD",
        "ARIZE_PHNX",
    ] {
        assert!(env.contains(var), "{} not documented", var);
    }
}

#[test]
fn test_compose_services() {
    let compose = repo_file("docker-compose.yml");
    for service in ["index-sync:", "laws-chroma:", "procedures-chroma:", "redis:", "app:"] {
        assert!(compose.contains(service), "missing service {}", service);
    }
    assert!(compose.contains("\"8501:8501\""));
    assert!(compose.contains("service_completed_successfully"));
}

fn runner() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("run-tests.sh")
}

#[test]
fn test_runner_menu_lists_five_options() {
    let script = repo_file("run-tests.sh");
    let batch = repo_file("run-tests.bat");
    for option in ["1)", "2)", "3)", "4)", "5)"] {
        assert!(script.contains(option));
        assert!(batch.contains(option));
    }
    assert!(script.contains("--skip integration --skip performance"));
    assert!(batch.contains("--skip integration --skip performance"));
}

#[cfg(unix)]
#[test]
fn test_runner_rejects_invalid_choice() {
    let status = std::process::Command::new("bash")
        .arg(runner())
        .arg("9")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .unwrap();
    assert!(!status.success());
}

#[cfg(unix)]
#[test]
fn test_runner_rejects_missing_test_file() {
    let status = std::process::Command::new("bash")
        .arg(runner())
        .args(["4", "no_such_suite"])
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .unwrap();
    assert_eq!(status.code(), Some(1));
}
