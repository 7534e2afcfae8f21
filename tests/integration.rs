//! End-to-end extraction scenarios, run through the public plugin surface
//! rather than any single internal module.

use similar::{ChangeTag, TextDiff};

use severed::{PluginOptions, SeveredPlugin};

fn plugin() -> SeveredPlugin {
    SeveredPlugin::new(PluginOptions::default())
}

/// Asserts `actual == expected`, printing a line-level diff instead of the
/// raw strings when they disagree.
fn assert_matches(actual: &str, expected: &str) {
    if actual == expected {
        return;
    }
    let diff = TextDiff::from_lines(expected, actual);
    let mut rendered = String::new();
    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Delete => "-",
            ChangeTag::Insert => "+",
            ChangeTag::Equal => " ",
        };
        rendered.push_str(&format!("{sign}{change}"));
    }
    panic!("output did not match expected:\n{rendered}");
}

#[test]
fn static_site_becomes_a_class_name_string_and_stores_css() {
    let plugin = plugin();
    let source = "export const button = css`color: red; padding: 4px;`;\n";
    let output = plugin.transform("src/button.js", source).unwrap().unwrap();

    assert!(!output.code.contains("css`"));
    assert!(output.code.contains("export const button ="));
    assert!(output.css.contains("color: red; padding: 4px;"));
}

#[test]
fn dynamic_site_evaluates_its_interpolation() {
    let plugin = plugin();
    let source = "\
const theme = 'midnight';
export const panel = css`background: ${theme};`;
";
    let output = plugin.transform("src/panel.js", source).unwrap().unwrap();

    assert!(!output.code.contains("css`"));
    assert!(output.css.contains("background: midnight;"));
}

#[test]
fn unused_side_effecting_top_level_code_does_not_block_extraction() {
    let plugin = plugin();
    let source = "\
trackPageView();
const spacing = 8;
export const card = css`margin: ${spacing}px;`;
";
    let output = plugin.transform("src/card.js", source).unwrap().unwrap();

    assert!(output.css.contains("margin: 8px;"));
}

#[test]
fn missing_interpolation_value_surfaces_as_an_evaluation_error() {
    let plugin = plugin();
    // `undefinedColor` is never declared anywhere in this file or anything
    // it imports, so the derivative program throws a ReferenceError when run.
    let source = "export const broken = css`color: ${undefinedColor};`;\n";
    let err = plugin.transform("src/broken.js", source).unwrap_err();

    let message = err.to_string();
    assert!(message.starts_with("Failed to evaluate `src/broken.js` while extracting css:"));
}

#[test]
fn nested_dynamic_site_hoists_above_its_enclosing_statement() {
    let plugin = plugin();
    let source = "\
const mode = 'dark';
if (mode === 'dark') {
  const accent = css`color: ${mode};`;
  apply(accent);
}
";
    let output = plugin.transform("src/theme.js", source).unwrap().unwrap();

    assert!(output.css.contains("color: dark;"));
    assert!(!output.code.contains("css`"));
}

#[test]
fn re_exported_and_wildcard_exports_are_stripped_without_breaking_extraction() {
    let plugin = plugin();
    let source = "\
export * from './other.js';
const weight = 'bold';
export const label = css`font-weight: ${weight};`;
export { label as exportedLabel };
";
    let output = plugin.transform("src/label.js", source).unwrap().unwrap();

    assert!(output.css.contains("font-weight: bold;"));
    assert!(output.code.contains("export const label ="));
}

#[test]
fn push_mode_rewrites_to_a_flattened_css_asset_import() {
    let plugin = SeveredPlugin::new(PluginOptions::default().with_write_css_files(true));
    let source = "export const a = css`color: blue;`;\n";
    let output = plugin.transform("widget.js", source).unwrap().unwrap();

    assert!(output.code.contains(".severed.css"));
    assert!(!output.code.contains("?severed="));
}

#[test]
fn non_matching_files_pass_through_untouched() {
    let plugin = plugin();
    let result = plugin.transform("src/plain.js", "export const x = 1;\n").unwrap();
    assert!(result.is_none());
}

#[test]
fn accumulated_css_matches_expected_fragment_layout() {
    let plugin = plugin();
    let source = "\
export const a = css`color: red;`;
export const b = css`color: blue;`;
";
    let output = plugin.transform("src/two.js", source).unwrap().unwrap();
    let fragments: Vec<&str> = output.css.split("\n\n\n").collect();
    assert_eq!(fragments.len(), 2);

    // class names are content hashes; replace the generated one with a
    // placeholder so the rest of the fragment's shape can be diffed exactly.
    let normalize = |fragment: &str| -> String {
        let (_class, rest) = fragment.split_once(' ').expect("fragment starts with a class selector");
        format!(".<class> {rest}")
    };

    assert_matches(&normalize(fragments[0]), ".<class> { color: red; }");
    assert_matches(&normalize(fragments[1]), ".<class> { color: blue; }");
}
