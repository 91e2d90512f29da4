use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use testgrow::resolve::{self, TestId};

fn touch(path: &Path) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, "").unwrap();
}

struct Project {
    _dir: TempDir,
    source: PathBuf,
    tests: PathBuf,
}

fn project() -> Project {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("source_files");
    let tests = dir.path().join("tests");
    touch(&source.join("a.py"));
    touch(&source.join("pkg").join("c.py"));
    touch(&tests.join("test_a_0.py"));
    touch(&tests.join("test_a_1.py"));
    touch(&tests.join("test_a_10.py"));
    touch(&tests.join("test_ab_0.py"));
    touch(&tests.join("pkg").join("test_c_0.py"));
    Project { _dir: dir, source, tests }
}

#[test]
fn test_file_names_carry_chunk_index() {
    assert_eq!(resolve::test_file_name("calc", 0), "test_calc_0.py");
    assert_eq!(resolve::test_file_name("policy_service", 3), "test_policy_service_3.py");
}

#[test]
fn expected_path_mirrors_package_layout() {
    let p = project();
    assert_eq!(
        resolve::expected_test_path(&p.source, &p.tests, &p.source.join("pkg").join("c.py"), 2),
        Some(p.tests.join("pkg").join("test_c_2.py"))
    );
    assert_eq!(
        resolve::expected_test_path(&p.source, &p.tests, &p.source.join("a.py"), 0),
        Some(p.tests.join("test_a_0.py"))
    );
}

#[test]
fn forward_resolution_orders_chunks_numerically() {
    let p = project();
    let files = resolve::test_files_for(&p.source, &p.tests, &p.source.join("a.py"));
    assert_eq!(
        files,
        vec![p.tests.join("test_a_0.py"), p.tests.join("test_a_1.py"), p.tests.join("test_a_10.py")]
    );
}

#[test]
fn forward_resolution_without_tests_is_empty() {
    let p = project();
    touch(&p.source.join("lonely.py"));
    assert!(resolve::test_files_for(&p.source, &p.tests, &p.source.join("lonely.py")).is_empty());
}

#[test]
fn reverse_resolution_round_trips() {
    let p = project();
    for module in [p.source.join("a.py"), p.source.join("pkg").join("c.py")] {
        for test_file in resolve::test_files_for(&p.source, &p.tests, &module) {
            assert_eq!(
                resolve::source_for_test_file(&p.tests, &p.source, &test_file),
                Some(module.clone())
            );
        }
    }
}

#[test]
fn reverse_resolution_falls_back_to_search() {
    let p = project();
    let stray = p.tests.join("test_c_0.py");
    touch(&stray);
    assert_eq!(
        resolve::source_for_test_file(&p.tests, &p.source, &stray),
        Some(p.source.join("pkg").join("c.py"))
    );
    assert_eq!(
        resolve::source_for_test_file(&p.tests, &p.source, &p.tests.join("test_missing_0.py")),
        None
    );
}

#[test]
fn source_names_strip_prefix_and_chunk() {
    assert_eq!(resolve::source_name_for_test("test_policy_service_2.py"), "policy_service.py");
    assert_eq!(resolve::source_name_for_test("test_a.py"), "a.py");
    assert_eq!(resolve::source_name_for_test("test_a_0.py"), "a.py");
}

#[test]
fn class_names_become_snake_case_prefixes() {
    assert_eq!(resolve::class_to_file_prefix("TestPolicyService"), "test_policy_service");
    assert_eq!(resolve::class_to_file_prefix("TestA"), "test_a");
    assert_eq!(resolve::class_to_file_prefix("Calc"), "test_calc");
}

#[test]
fn test_id_parsing() {
    let id = TestId::parse("tests.pkg.test_c_0.TestC.test_add").unwrap();
    assert_eq!(id.packages, vec!["tests", "pkg"]);
    assert_eq!(id.module, Some("test_c_0"));
    assert_eq!(id.class_name, "TestC");
    assert_eq!(id.method, "test_add");

    let short = TestId::parse("TestC.test_add").unwrap();
    assert!(short.packages.is_empty());
    assert_eq!(short.module, None);

    assert!(TestId::parse("test_add").is_none());
    assert!(TestId::parse("a..b").is_none());
}

#[test]
fn class_resolution_prefers_matching_package() {
    let p = project();
    touch(&p.tests.join("test_c_0.py"));

    assert_eq!(
        resolve::test_file_for_id(&p.tests, "tests.pkg.test_c_0.TestC.test_x"),
        Some(p.tests.join("pkg").join("test_c_0.py"))
    );
    assert_eq!(
        resolve::test_file_for_id(&p.tests, "tests.test_c_0.TestC.test_x"),
        Some(p.tests.join("test_c_0.py"))
    );
}

#[test]
fn class_resolution_does_not_match_longer_names() {
    let p = project();
    // test_ab_0.py must not satisfy class TestA's prefix.
    assert_eq!(
        resolve::test_file_for_id(&p.tests, "tests.test_a_0.TestA.test_x"),
        Some(p.tests.join("test_a_0.py"))
    );
    assert_eq!(resolve::test_file_for_id(&p.tests, "tests.test_z.TestZ.test_x"), None);
}

#[test]
fn source_resolution_from_test_id() {
    let p = project();
    assert_eq!(
        resolve::source_for_test_id(&p.source, "tests.test_a_0.TestA.test_x"),
        Some(p.source.join("a.py"))
    );
    assert_eq!(
        resolve::source_for_test_id(&p.source, "tests.pkg.test_c_0.TestC.test_x"),
        Some(p.source.join("pkg").join("c.py"))
    );
    assert_eq!(resolve::source_for_test_id(&p.source, "tests.test_q.TestQ.test_x"), None);
}
