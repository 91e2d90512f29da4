//! Prompt text handed to the oracle at each stage.

use crate::mutants::MutationRecord;
use crate::report::CoverageGapRecord;

const PATH_SETUP: &str = r#"import os
import sys

current_dir = os.path.dirname(os.path.abspath(__file__))
source_root = current_dir.replace(os.path.sep + "{test_dir}", os.path.sep + "{source_dir}")
path = source_root
while path not in sys.path and os.path.isdir(path):
    sys.path.insert(0, path)
    parent = os.path.dirname(path)
    if parent == path:
        break
    path = parent"#;

/// New test module for one chunk of a source file.
pub fn generation(chunk: &str, module_name: &str, source_dir: &str, test_dir: &str) -> String {
    let setup = PATH_SETUP.replace("{test_dir}", test_dir).replace("{source_dir}", source_dir);
    format!(
        "Write a complete Python unittest module for the code below.\n\
         \n\
         Requirements:\n\
         1. Start with `import unittest` and put this path setup before any project import:\n\
         ```python\n{setup}\n```\n\
         2. Import the code under test with `from {module_name} import *`.\n\
         3. Define one class inheriting from `unittest.TestCase` with a `setUp` method.\n\
         4. Cover valid inputs, invalid inputs, boundary values and empty or None inputs, \
         one edge case per test method.\n\
         5. Mock external dependencies with `unittest.mock`.\n\
         6. End with `if __name__ == \"__main__\": unittest.main()`.\n\
         7. Answer with Python code only.\n\
         \n\
         Code:\n```python\n{chunk}\n```\n"
    )
}

/// Additional methods targeting uncovered statements and branches.
pub fn branch_coverage(source: &str, tests: &str, gap: &CoverageGapRecord) -> String {
    format!(
        "The module `{module}` has {pct}% coverage with {stmts} statements and {branches} branches \
         not covered by its current tests.\n\
         \n\
         Source:\n```python\n{source}\n```\n\
         \n\
         Existing tests:\n```python\n{tests}\n```\n\
         \n\
         Write only new test methods (each `def test_...(self):`) that exercise the missing \
         statements and branches. Do not repeat existing tests, do not write a class, \
         imports or a main block.\n",
        module = gap.module_path,
        pct = gap.coverage_percent,
        stmts = gap.statements_missing,
        branches = gap.branches_missing,
    )
}

/// Repair of one failing test method.
pub fn fix(source: &str, test_method: &str, reason: &str) -> String {
    format!(
        "This unittest method fails against the source below.\n\
         \n\
         Source:\n```python\n{source}\n```\n\
         \n\
         Failing test:\n```python\n{test_method}\n```\n\
         \n\
         Failure:\n```\n{reason}\n```\n\
         \n\
         Return the corrected test method only, keeping its name. If the source is wrong \
         rather than the test, adjust the expectation to the current behavior.\n"
    )
}

/// Methods that would fail under the given mutation of the source.
pub fn mutation(source: &str, tests: &str, record: &MutationRecord) -> String {
    format!(
        "A mutation testing run changed line {line} of `{module}` ({kind}) and the tests \
         below did not notice.\n\
         \n\
         Mutation:\n```diff\n{diff}```\n\
         \n\
         Source:\n```python\n{source}\n```\n\
         \n\
         Existing tests:\n```python\n{tests}\n```\n\
         \n\
         Write new test methods (each `def test_...(self):`) that pass on the original source \
         and fail on the mutated one. Methods only: no class, imports or main block.\n",
        line = record.line_number,
        module = record.source_module_path,
        kind = record.operator_kind,
        diff = record.diff,
    )
}
