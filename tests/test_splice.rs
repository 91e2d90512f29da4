use std::fs;

use tempfile::TempDir;
use testgrow::parser;
use testgrow::splice::{self, SpliceOutcome};

const TEST_A: &str = r#"import unittest


class TestA(unittest.TestCase):
    def test_one(self):
        self.assertTrue(True)


if __name__ == "__main__":
    unittest.main()
"#;

const GUARD: &str = "if __name__ == \"__main__\":\n    unittest.main()\n";

fn inserted_text(outcome: SpliceOutcome) -> String {
    match outcome {
        SpliceOutcome::Inserted { text, .. } => text,
        other => panic!("expected Inserted, got {other:?}"),
    }
}

#[test]
fn method_lands_inside_class_before_main_guard() {
    let fragment = "def test_extra(self):\n    self.assertTrue(True)\n";
    let text = inserted_text(splice::splice(TEST_A, fragment, None, 4));

    assert!(text.contains("\n    def test_extra(self):\n        self.assertTrue(True)\n"));
    let method_at = text.find("def test_extra").unwrap();
    let guard_at = text.find("if __name__").unwrap();
    assert!(method_at > text.find("class TestA").unwrap());
    assert!(method_at < guard_at);
    assert_eq!(text.matches(GUARD).count(), 1);
    assert!(text.ends_with(GUARD));
}

#[test]
fn zero_method_fragment_leaves_text_unchanged() {
    for fragment in ["", "Sorry, I cannot help with that.", "x = 1\nassert x\n"] {
        assert_eq!(splice::splice(TEST_A, fragment, None, 4), SpliceOutcome::EmptyFragment);
    }
}

#[test]
fn method_count_grows_by_n_and_doubles_on_repeat() {
    let fragment = "def test_p(self):\n    pass\n\ndef test_q(self):\n    pass\n";
    let before = splice::count_test_methods(TEST_A);

    let once = inserted_text(splice::splice(TEST_A, fragment, None, 4));
    assert_eq!(splice::count_test_methods(&once), before + 2);

    let twice = inserted_text(splice::splice(&once, fragment, None, 4));
    assert_eq!(splice::count_test_methods(&twice), before + 4);
    assert_eq!(twice.matches("def test_p(self):").count(), 2);
}

#[test]
fn oracle_indentation_is_ignored() {
    let fragment = "        def test_deep(self):\n  x = 1\n            self.assertEqual(x, 1)\n";
    let text = inserted_text(splice::splice(TEST_A, fragment, None, 4));
    assert!(text.contains("    def test_deep(self):\n        x = 1\n        self.assertEqual(x, 1)\n"));
}

#[test]
fn indentation_follows_nested_class_width() {
    let existing = "import unittest\n\nif True:\n    class TestB(unittest.TestCase):\n        def test_a(self):\n            pass\n";
    let text = inserted_text(splice::splice(existing, "def test_b(self):\n    pass\n", None, 4));
    assert!(text.ends_with("\n        def test_b(self):\n            pass\n"));
}

#[test]
fn two_space_class_keeps_its_own_step() {
    let two_space = "import unittest\n\nclass TestC(unittest.TestCase):\n  def test_a(self):\n    pass\n";
    let text = inserted_text(splice::splice(two_space, "def test_b(self):\n    pass\n", None, 4));
    assert!(text.ends_with("\n  def test_b(self):\n    pass\n"));
    assert_eq!(parser::class_test_methods(&text, "TestC"), vec!["test_a", "test_b"]);
}

#[test]
fn tab_indented_class_gets_tabs() {
    let tabbed = "import unittest\n\n\nclass TestA(unittest.TestCase):\n\tdef test_a(self):\n\t\tpass\n";
    let fragment = "def test_b(self):\n    with self.assertRaises(KeyError):\n        {}['x']\n    self.assertTrue(True)\n";
    let text = inserted_text(splice::splice(tabbed, fragment, None, 4));
    assert!(text.ends_with(
        "\n\tdef test_b(self):\n\t\twith self.assertRaises(KeyError):\n\t\t\t{}['x']\n\t\tself.assertTrue(True)\n"
    ));
    assert!(text.lines().all(|l| !l.starts_with(' ')));
    assert_eq!(parser::class_test_methods(&text, "TestA"), vec!["test_a", "test_b"]);
}

#[test]
fn header_without_body_uses_configured_unit() {
    let bare = "import unittest\n\nclass TestE(unittest.TestCase):\n";
    let text = inserted_text(splice::splice(bare, "def test_a(self):\n    pass\n", None, 2));
    assert!(text.ends_with("class TestE(unittest.TestCase):\n\n  def test_a(self):\n    pass\n"));
}

#[test]
fn insertion_inside_string_is_misplaced() {
    let existing = "import unittest\n\n\nclass TestA(unittest.TestCase):\n    def test_a(self):\n        s = \"\"\"\nraw text at column zero\n\"\"\"\n        self.assertTrue(s)\n";
    let outcome = splice::splice(existing, "def test_b(self):\n    pass\n", None, 4);
    assert_eq!(outcome, SpliceOutcome::Misplaced { expected: 2, found: 1 });
    assert_eq!(outcome.label(), "misplaced");
}

#[test]
fn misplaced_splice_leaves_file_untouched() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("test_a_0.py");
    let existing = "import unittest\n\n\nclass TestA(unittest.TestCase):\n    def test_a(self):\n        s = '''\ncolumn zero\n'''\n";
    fs::write(&path, existing).unwrap();

    let outcome = splice::splice_file(&path, "def test_b(self):\n    pass\n", None, 4).unwrap();
    assert!(matches!(outcome, SpliceOutcome::Misplaced { .. }));
    assert_eq!(fs::read_to_string(&path).unwrap(), existing);
}

#[test]
fn nested_block_gets_third_level() {
    let fragment = "def test_raises(self):\nwith self.assertRaises(ValueError):\nint(\"x\")\nself.assertTrue(True)\n";
    let text = inserted_text(splice::splice(TEST_A, fragment, None, 4));
    assert!(text.contains(
        "    def test_raises(self):\n        with self.assertRaises(ValueError):\n            int(\"x\")\n        self.assertTrue(True)\n"
    ));
}

#[test]
fn no_test_class_is_noop() {
    let plain = "def helper():\n    return 1\n";
    assert_eq!(
        splice::splice(plain, "def test_a(self):\n    pass\n", None, 4),
        SpliceOutcome::NoTestClass
    );
}

#[test]
fn target_class_is_honored() {
    let existing = "import unittest\n\n\nclass TestA(unittest.TestCase):\n    def test_a(self):\n        pass\n\n\nclass TestB(unittest.TestCase):\n    def test_b(self):\n        pass\n";
    let fragment = "def test_new(self):\n    pass\n";

    let into_b = inserted_text(splice::splice(existing, fragment, Some("TestB"), 4));
    assert!(into_b.find("def test_new").unwrap() > into_b.find("class TestB").unwrap());

    let into_first = inserted_text(splice::splice(existing, fragment, None, 4));
    assert!(into_first.find("def test_new").unwrap() < into_first.find("class TestB").unwrap());

    let unknown = inserted_text(splice::splice(existing, fragment, Some("TestZ"), 4));
    assert_eq!(unknown, into_first);
}

#[test]
fn fenced_answer_with_commentary() {
    let fragment = "Here are the tests:\n```python\ndef test_f(self):\n    self.assertEqual(1, 1)\n```\nThese cover the branch.";
    let outcome = splice::splice(TEST_A, fragment, None, 4);
    assert_eq!(outcome.methods(), 1);
    assert!(!inserted_text(outcome).contains("Here are"));
}

#[test]
fn new_imports_are_hoisted_once() {
    let fragment = "import unittest\nfrom unittest import mock\n\ndef test_m(self):\n    self.assertIsNotNone(mock)\n";
    let text = inserted_text(splice::splice(TEST_A, fragment, None, 4));
    assert!(text.starts_with("import unittest\nfrom unittest import mock\n"));
    assert_eq!(text.matches("import unittest\n").count(), 1);
}

#[test]
fn guard_in_fragment_is_dropped() {
    let fragment = format!("def test_g(self):\n    pass\n\n{GUARD}");
    let text = inserted_text(splice::splice(TEST_A, &fragment, None, 4));
    assert_eq!(text.matches("if __name__").count(), 1);
}

#[test]
fn unparsable_result_is_rejected() {
    let outcome = splice::splice(TEST_A, "def test_bad(self):\n    x = (1,\n", None, 4);
    assert!(matches!(outcome, SpliceOutcome::Rejected { ref issues } if !issues.is_empty()));
}

#[test]
fn missing_final_newline_is_repaired() {
    let existing = "import unittest\n\nclass T(unittest.TestCase):\n    def test_a(self):\n        pass";
    let text = inserted_text(splice::splice(existing, "def test_b(self):\n    pass", None, 4));
    assert!(text.contains("        pass\n\n    def test_b(self):\n        pass\n"));
}

// --- files ---

#[test]
fn splice_file_writes_only_on_insert() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("test_a_0.py");
    fs::write(&path, TEST_A).unwrap();

    let outcome = splice::splice_file(&path, "no code here", None, 4).unwrap();
    assert_eq!(outcome, SpliceOutcome::EmptyFragment);
    assert_eq!(fs::read_to_string(&path).unwrap(), TEST_A);

    let outcome = splice::splice_file(&path, "def test_z(self):\n    pass\n", None, 4).unwrap();
    assert!(outcome.is_inserted());
    assert!(fs::read_to_string(&path).unwrap().contains("    def test_z(self):"));
}

#[test]
fn rejected_splice_leaves_file_untouched() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("test_a_0.py");
    fs::write(&path, TEST_A).unwrap();

    let outcome = splice::splice_file(&path, "def test_bad(self):\n    x = (1,\n", None, 4).unwrap();
    assert!(matches!(outcome, SpliceOutcome::Rejected { .. }));
    assert_eq!(fs::read_to_string(&path).unwrap(), TEST_A);
}

#[test]
fn splice_file_missing_is_read_error() {
    let dir = TempDir::new().unwrap();
    assert!(splice::splice_file(&dir.path().join("nope.py"), "def test_a(self): pass", None, 4).is_err());
}

// --- method replacement ---

const FAILING: &str = r#"import unittest


class TestA(unittest.TestCase):
    def test_one(self):
        self.assertEqual(1, 2)

    def test_two(self):
        self.assertTrue(True)


if __name__ == "__main__":
    unittest.main()
"#;

#[test]
fn extract_method_returns_full_method() {
    assert_eq!(
        splice::extract_method(FAILING, "test_one").unwrap(),
        "    def test_one(self):\n        self.assertEqual(1, 2)\n"
    );
    assert!(splice::extract_method(FAILING, "test_missing").is_none());
}

#[test]
fn remove_method_drops_method_and_separator() {
    let text = splice::remove_method(FAILING, "test_one").unwrap();
    assert!(!text.contains("test_one"));
    assert!(text.contains("class TestA(unittest.TestCase):\n\n    def test_two(self):"));
}

#[test]
fn replace_method_swaps_in_one_write() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("test_a_0.py");
    fs::write(&path, FAILING).unwrap();

    let fixed = "```python\ndef test_one(self):\n    self.assertEqual(2, 2)\n```";
    let outcome = splice::replace_method_in_file(&path, "test_one", fixed, Some("TestA"), 4).unwrap();
    assert!(outcome.is_inserted());

    let text = fs::read_to_string(&path).unwrap();
    assert_eq!(text.matches("def test_one").count(), 1);
    assert!(text.contains("self.assertEqual(2, 2)"));
    assert!(!text.contains("self.assertEqual(1, 2)"));
    assert_eq!(splice::count_test_methods(&text), 2);
    assert!(text.ends_with(GUARD));
}
