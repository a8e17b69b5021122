//! Built-in challenges so the service is usable without an LLM or a config bank.

use crate::domain::{Challenge, ChallengeSource, ChallengeSpec, Difficulty, NaturalLanguage, ProgrammingLanguage, TestCase, TestValue};

fn case(input: &str, expected: &str) -> TestCase {
  TestCase { input: TestValue::Expr(input.into()), expected_output: TestValue::Expr(expected.into()), description: None }
}

pub fn seed_challenges() -> Vec<Challenge> {
  vec![
    Challenge {
      id: "seed-double".into(),
      source: ChallengeSource::Seed,
      spec: ChallengeSpec {
        title: "Double the numbers".into(),
        description: "Write a function `double` that takes an array of numbers and returns a new array with every element multiplied by two.".into(),
        natural_language: NaturalLanguage::En,
        programming_language: ProgrammingLanguage::TypeScript,
        difficulty: Difficulty::Easy,
        initial_code: "function double(arr: number[]): number[] {\n    // your code here\n}\n\nconsole.log(double([1, 2, 3])); // Expected: [2, 4, 6]".into(),
        reference_solution: "function double(arr: number[]): number[] {\n    return arr.map(x => x * 2);\n}".into(),
        test_cases: vec![case("[1, 2, 3]", "[2, 4, 6]"), case("[]", "[]"), case("[-5, 0, 7]", "[-10, 0, 14]")],
        hints: vec![
          "Array.prototype.map builds a new array from a callback.".into(),
          "The callback receives each element; return it times two.".into(),
        ],
      },
    },
    Challenge {
      id: "seed-vowels".into(),
      source: ChallengeSource::Seed,
      spec: ChallengeSpec {
        title: "Count the vowels".into(),
        description: "Write a function `count_vowels` that returns how many vowels (a, e, i, o, u, case-insensitive) a string contains.".into(),
        natural_language: NaturalLanguage::En,
        programming_language: ProgrammingLanguage::Python,
        difficulty: Difficulty::Easy,
        initial_code: "def count_vowels(text: str) -> int:\n    # your code here\n    pass\n\nprint(count_vowels(\"Hello\"))  # Expected: 2".into(),
        reference_solution: "def count_vowels(text: str) -> int:\n    return sum(1 for ch in text.lower() if ch in \"aeiou\")".into(),
        test_cases: vec![case("\"Hello\"", "2"), case("\"rhythm\"", "0"), case("\"AEIOU\"", "5")],
        hints: vec![
          "Lower-case the text first so you only compare against one set of letters.".into(),
          "A generator expression inside sum() counts matches in one line.".into(),
        ],
      },
    },
  ]
}
