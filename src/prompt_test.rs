// Unit tests for prompt construction and sanitization

use super::*;
use crate::types::{SuiteConfig, SuiteId, Test};
use chrono::TimeZone;
use pretty_assertions::assert_eq;

fn login_page() -> PageDetails {
    PageDetails {
        url: "https://example.com/login".to_string(),
        title: "Login".to_string(),
        timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
    }
}

fn login_elements() -> Vec<Element> {
    vec![Element::new("button", "Log in").with_id("login-btn")]
}

fn suite_with(bodies: &[&str]) -> Suite {
    let mut suite = Suite::new(SuiteId::from("suite-1"), "Login flow");
    for (i, body) in bodies.iter().enumerate() {
        suite.tests.insert(
            0,
            Test {
                instructions: format!("step {}", i + 1),
                body: body.to_string(),
                filename: format!("step-{}.spec.js", i + 1),
                description: String::new(),
                url: "/login".to_string(),
                timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, i as u32).unwrap(),
                snapshots: vec![],
            },
        );
    }
    suite
}

#[test]
fn test_prompt_embeds_page_and_elements() {
    let prompt =
        PromptBuilder::new().build_test_prompt("click the login button", &login_page(), &login_elements(), &[]);

    assert!(prompt.user.contains("Test Case: click the login button"));
    assert!(prompt.user.contains("URL: https://example.com/login"));
    assert!(prompt.user.contains("Title: Login"));
    assert!(prompt.user.contains("\"id\": \"login-btn\""));
    assert!(prompt.system.contains("Never invent ids"));
    assert!(prompt.system.contains("No Markdown code fences"));
    assert!(prompt.system.contains("{ page }"));
}

#[test]
fn test_prompt_is_deterministic() {
    let builder = PromptBuilder::new();
    let snapshot = Snapshot::new("Snapshot 1", login_elements(), login_page().timestamp);
    let a = builder.build_test_prompt("x", &login_page(), &login_elements(), &[snapshot.clone()]);
    let b = builder.build_test_prompt("x", &login_page(), &login_elements(), &[snapshot]);
    assert_eq!(a, b);
}

#[test]
fn test_prompt_tags_snapshots_with_labels() {
    let snapshot = Snapshot::new(
        "After login",
        vec![Element::new("h1", "Dashboard")],
        login_page().timestamp,
    );
    let prompt = PromptBuilder::new().build_test_prompt("x", &login_page(), &[], &[snapshot]);
    assert!(prompt.user.contains("Snapshot \"After login\" elements:"));
    assert!(prompt.user.contains("Dashboard"));
}

#[test]
fn test_prompt_caps_element_count() {
    let elements: Vec<Element> = (0..10).map(|i| Element::new("li", format!("item {}", i))).collect();
    let prompt = PromptBuilder::with_max_elements(3).build_test_prompt("x", &login_page(), &elements, &[]);
    assert!(prompt.user.contains("item 2"));
    assert!(!prompt.user.contains("item 3"));
    assert!(prompt.user.contains("(showing 3 of 10 elements)"));
}

#[test]
fn test_sanitize_strips_fences_and_imports() {
    let raw = "Here you go:\n```javascript\nimport { test, expect } from '@playwright/test';\n\ntest('login', async ({ page }) => {\n  await page.locator('#login-btn').click();\n});\n```\nHope this helps";
    assert_eq!(
        sanitize(raw),
        "test('login', async ({ page }) => {\n  await page.locator('#login-btn').click();\n});"
    );
}

#[test]
fn test_sanitize_strips_language_echo_and_blank_lines() {
    let raw = "\n\njavascript\nconst { test } = require('@playwright/test');\n\ntest('a', async ({ page }) => {});\n\n\n";
    assert_eq!(sanitize(raw), "test('a', async ({ page }) => {});");
}

#[test]
fn test_sanitize_strips_multiline_imports() {
    let raw = "import {\n  test,\n  expect\n} from '@playwright/test';\ntest('a', async ({ page }) => {});";
    assert_eq!(sanitize(raw), "test('a', async ({ page }) => {});");

    let raw = "import {\n  fromEvent,\n  map\n} from 'rxjs';\ntest('a', async ({ page }) => {});";
    assert_eq!(sanitize(raw), "test('a', async ({ page }) => {});");
}

#[test]
fn test_multiline_import_with_from_identifier_is_one_statement() {
    let script = "import {\n  fromEvent,\n  map\n} from 'rxjs';\ntest('a', async ({ page }) => {});";
    assert_eq!(
        imports_in(script),
        vec!["import { fromEvent, map } from 'rxjs';".to_string()]
    );
}

#[test]
fn test_sanitize_unclosed_fence() {
    let raw = "```ts\ntest('a', async ({ page }) => {});";
    assert_eq!(sanitize(raw), "test('a', async ({ page }) => {});");
}

#[test]
fn test_sanitize_is_idempotent() {
    let samples = [
        "```javascript\nimport { test } from '@playwright/test';\ntest('a', async ({ page }) => {\n  await page.locator('button:has-text(\"Save\")').click();\n});\n```",
        "typescript\n\n\ntest('b', async ({ page }) => {\n  await page.locator('text=Sign up').click();\n});\n",
        "  \ntest('c', async ({ page }) => {});  \n\n",
        "",
        "// just a comment",
    ];
    for raw in samples {
        let once = sanitize(raw);
        assert_eq!(sanitize(&once), once, "not idempotent for {:?}", raw);
    }
}

#[test]
fn test_selector_rules_table() {
    let cases = [
        (
            "page.locator('button:has-text(\"Log in\")')",
            "page.locator('button', { hasText: \"Log in\" })",
        ),
        (
            "page.locator(\"a.nav:has-text('Home')\")",
            "page.locator(\"a.nav\", { hasText: 'Home' })",
        ),
        (
            "page.locator('li:contains(\"First\")')",
            "page.locator('li', { hasText: \"First\" })",
        ),
        (
            "page.locator(\"div:contains('Total')\")",
            "page.locator(\"div\", { hasText: 'Total' })",
        ),
        ("page.locator('text=Sign up')", "page.getByText('Sign up')"),
        // Modern selectors are left alone
        ("page.getByRole('button', { name: 'Save' })", "page.getByRole('button', { name: 'Save' })"),
        ("page.locator('#login-btn')", "page.locator('#login-btn')"),
    ];
    for (input, expected) in cases {
        assert_eq!(repair_selectors(input), expected);
    }
}

#[test]
fn test_each_selector_rule_is_a_fixed_point_on_its_output() {
    for rule in SELECTOR_RULES.iter() {
        let sample = "page.locator('button:has-text(\"x\")'); page.locator(\"a:contains('y')\"); page.locator('text=z')";
        let once = rule.apply(sample);
        assert_eq!(rule.apply(&once), once, "rule {} is not idempotent", rule.name);
    }
}

#[test]
fn test_parse_filename() {
    assert_eq!(parse_filename("login-button-click").as_deref(), Some("login-button-click.spec.js"));
    assert_eq!(parse_filename("`Checkout Flow.spec.js`\n").as_deref(), Some("checkout-flow.spec.js"));
    assert_eq!(parse_filename("\"add item to cart!\"").as_deref(), Some("add-item-to-cart.spec.js"));
    assert_eq!(parse_filename("   "), None);
    assert_eq!(parse_filename("!!!"), None);
}

#[test]
fn test_fallback_filename_uses_timestamp() {
    let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    assert_eq!(fallback_filename(now), format!("test-{}.spec.js", now.timestamp_millis()));
    assert!(fallback_filename(now).ends_with(".spec.js"));
}

#[test]
fn test_suite_filename() {
    assert_eq!(suite_filename("Login flow"), "login-flow.spec.js");
    assert_eq!(suite_filename("???"), "suite.spec.js");
}

#[test]
fn test_suite_prompt_includes_config_and_tests() {
    let mut suite = suite_with(&["test('one', async ({ page }) => {});", "test('two', async ({ page }) => {});"]);
    suite.config = SuiteConfig {
        setup_code: Some("await page.goto('/login');".into()),
        teardown_code: Some("   ".into()),
        imports: Some("import { faker } from '@faker-js/faker';".into()),
    };

    let prompt = PromptBuilder::new().build_suite_prompt(&suite);
    let one = prompt.user.find("test('one'").unwrap();
    let two = prompt.user.find("test('two'").unwrap();
    assert!(one < two, "tests should be listed oldest first");
    assert!(prompt.user.contains("test.beforeEach:\nawait page.goto('/login');"));
    assert!(!prompt.user.contains("test.afterEach"));
    assert!(prompt.user.contains("@faker-js/faker"));
    assert!(prompt.user.contains("(2 in total)"));
}

#[test]
fn test_collect_imports_deduplicates() {
    let mut suite = suite_with(&[
        "import { faker } from '@faker-js/faker';\ntest('one', async ({ page }) => {});",
        "import dayjs from 'dayjs';\nimport { test, expect } from \"@playwright/test\"\ntest('two', async ({ page }) => {});",
    ]);
    suite.config.imports = Some("import { faker } from '@faker-js/faker';\nimport path from 'path';".into());

    assert_eq!(
        collect_imports(&suite),
        vec![
            PLAYWRIGHT_IMPORT.to_string(),
            "import { faker } from '@faker-js/faker';".to_string(),
            "import path from 'path';".to_string(),
            "import dayjs from 'dayjs';".to_string(),
        ]
    );
}

#[test]
fn test_finalize_suite_prepends_each_import_once() {
    let mut suite = suite_with(&[
        "import { faker } from '@faker-js/faker';\ntest('one', async ({ page }) => {});",
        "import dayjs from 'dayjs';\ntest('two', async ({ page }) => {});",
    ]);
    suite.config.imports = Some("import path from 'path';".into());

    let raw = "```javascript\nimport { test, expect } from '@playwright/test';\nimport dayjs from 'dayjs';\n\ntest.describe('Login flow', () => {\n  test('one', async ({ page }) => {});\n  test('two', async ({ page }) => {});\n});\n```";
    let file = finalize_suite(raw, &suite).unwrap();

    for import in [
        PLAYWRIGHT_IMPORT,
        "import { faker } from '@faker-js/faker';",
        "import dayjs from 'dayjs';",
        "import path from 'path';",
    ] {
        assert_eq!(file.matches(import).count(), 1, "{} in\n{}", import, file);
    }
    assert_eq!(count_test_blocks(&file), 2);
    assert!(file.starts_with(PLAYWRIGHT_IMPORT));
    assert!(file.ends_with("});\n"));
}

#[test]
fn test_finalize_suite_rejects_missing_markers() {
    let suite = suite_with(&["test('one', async () => {});", "test('two', async () => {});"]);
    let raw = "test.describe('x', () => {\n  test('only one', async ({ page }) => {});\n});";
    match finalize_suite(raw, &suite) {
        Err(PwgenError::ContentValidation { raw: kept, .. }) => assert_eq!(kept, raw),
        other => panic!("expected content validation error, got {:?}", other),
    }
}

#[test]
fn test_count_test_blocks_ignores_hooks() {
    let script = "test.describe('s', () => {\n  test.beforeEach(async () => {});\n  test('a', async () => {});\n  test.skip('b', async () => {});\n});";
    assert_eq!(count_test_blocks(script), 2);
}
