//! The CI workflow lints, format-checks and measures coverage over the whole
//! workspace on pushes and pull requests to `main`.

const WORKFLOW: &str = include_str!("../../../.github/workflows/ci.yml");

fn step_index(needle: &str) -> usize {
    WORKFLOW
        .find(needle)
        .unwrap_or_else(|| panic!("workflow is missing {needle:?}"))
}

#[test]
fn test_triggers_on_main() {
    let on = &WORKFLOW[step_index("on:")..step_index("jobs:")];
    assert!(on.contains("push:"));
    assert!(on.contains("pull_request:"));
    assert_eq!(on.matches("branches: [main]").count(), 2);
}

#[test]
fn test_steps_run_in_order() {
    let order = [
        "actions/checkout",
        "dtolnay/rust-toolchain",
        "cargo fetch",
        "cargo clippy --workspace --all-targets -- -D warnings",
        "cargo fmt --all -- --check",
        "cargo llvm-cov --workspace --cobertura --output-path coverage.xml",
        "codecov/codecov-action",
    ];
    let positions: Vec<usize> = order.into_iter().map(step_index).collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]), "{positions:?}");
}

#[test]
fn test_toolchain_components() {
    for component in ["clippy", "rustfmt", "llvm-tools-preview"] {
        assert!(WORKFLOW.contains(component), "missing {component}");
    }
}

#[test]
fn test_coverage_report_is_uploaded() {
    let upload = &WORKFLOW[step_index("codecov/codecov-action")..];
    assert!(upload.contains("files: coverage.xml"));
    assert!(!WORKFLOW.contains("continue-on-error"));
}
