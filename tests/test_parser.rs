use testgrow::mutants::OperatorKind;
use testgrow::parser;

const TEST_MODULE: &str = r#"import unittest


class TestCalc(unittest.TestCase):
    def setUp(self):
        self.x = 1

    def test_add(self):
        self.assertEqual(1 + 1, 2)

    def test_sub(self):
        self.assertEqual(2 - 1, 1)

    def helper(self):
        pass


if __name__ == "__main__":
    unittest.main()
"#;

#[test]
fn valid_module_has_no_syntax_errors() {
    assert!(parser::is_valid(TEST_MODULE));
    assert!(parser::syntax_errors(TEST_MODULE).is_empty());
}

#[test]
fn broken_indentation_is_reported() {
    let broken = "class T(unittest.TestCase):\n    def test_a(self):\n        x = (1,\n";
    let issues = parser::syntax_errors(broken);
    assert!(!issues.is_empty());
    assert!(!parser::is_valid(broken));
}

#[test]
fn syntax_issue_positions_are_one_based() {
    let issues = parser::syntax_errors("x = 1\ny = )\n");
    assert!(!issues.is_empty());
    assert!(issues.iter().all(|i| i.line >= 1 && i.column >= 1));
}

#[test]
fn lists_only_test_methods_in_classes() {
    let source = format!("{TEST_MODULE}\ndef test_module_level():\n    pass\n");
    assert_eq!(parser::list_test_methods(&source), vec!["test_add", "test_sub"]);
}

#[test]
fn nested_functions_are_not_methods() {
    let source = "class T(unittest.TestCase):\n  def test_a(self):\n    pass\n\n    def test_b(self):\n        pass\n";
    assert_eq!(parser::list_test_methods(source), vec!["test_a"]);
}

#[test]
fn decorated_methods_count() {
    let source = "class T(unittest.TestCase):\n    @unittest.skip('later')\n    def test_a(self):\n        pass\n";
    assert_eq!(parser::list_test_methods(source), vec!["test_a"]);
}

#[test]
fn methods_are_counted_per_class() {
    let source = "class A(unittest.TestCase):\n    def test_a(self):\n        pass\n\n\nclass B(unittest.TestCase):\n    def test_b(self):\n        pass\n\n    def test_c(self):\n        pass\n";
    assert_eq!(parser::class_test_methods(source, "A"), vec!["test_a"]);
    assert_eq!(parser::class_test_methods(source, "B"), vec!["test_b", "test_c"]);
    assert!(parser::class_test_methods(source, "C").is_empty());
}

#[test]
fn candidates_cover_each_operator_kind() {
    let source = "def f(a, b):\n    if a > b:\n        return a * b\n    return True\n";
    let candidates = parser::mutation_candidates(source);
    let kinds: Vec<(usize, OperatorKind)> = candidates.iter().map(|c| (c.line, c.kind)).collect();
    assert!(kinds.contains(&(2, OperatorKind::ComparisonReplace)));
    assert!(kinds.contains(&(3, OperatorKind::ArithmeticReplace)));
    assert!(kinds.contains(&(4, OperatorKind::ConstantReplace)));
}

#[test]
fn candidates_skip_print_and_logging() {
    let source = "def f(a):\n    print(a + 1)\n    logging.info(a > 2)\n    return a\n";
    assert!(parser::mutation_candidates(source).is_empty());
}

#[test]
fn candidates_ignore_module_level_code() {
    let source = "LIMIT = 10 + 5\n\ndef f():\n    return LIMIT\n";
    assert!(parser::mutation_candidates(source).is_empty());
}

#[test]
fn candidates_are_in_source_order_without_duplicates() {
    let source = "def f(a):\n    return a + 1 + 2\n";
    let candidates = parser::mutation_candidates(source);
    let arithmetic: Vec<_> = candidates
        .iter()
        .filter(|c| c.kind == OperatorKind::ArithmeticReplace)
        .collect();
    assert_eq!(arithmetic.len(), 1);
    let lines: Vec<usize> = candidates.iter().map(|c| c.line).collect();
    let mut sorted = lines.clone();
    sorted.sort();
    assert_eq!(lines, sorted);
}
