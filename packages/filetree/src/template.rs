// ABOUTME: Conversion between flat path->contents templates and nested file trees
// ABOUTME: Starter templates arrive flat; sandboxes and storage consume the nested tree

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::debug;

use crate::tree::FileTree;

/// Build a [`FileTree`] from a flat template map of `path -> value`.
///
/// String values are used verbatim. Binary assets encoded as
/// `{"binary": "<data>"}` keep their encoded string. Any other value is stored
/// as pretty-printed JSON so it stays visible instead of being dropped.
pub fn tree_from_template(files: &Map<String, Value>) -> FileTree {
    let mut tree = FileTree::new();
    for (path, value) in files {
        let contents = match value {
            Value::String(text) => text.clone(),
            Value::Object(object) => match object.get("binary") {
                Some(Value::String(binary)) => binary.clone(),
                _ => pretty_json(value),
            },
            other => pretty_json(other),
        };
        if let Err(e) = tree.insert_file(path, contents) {
            debug!("Skipping template entry: {}", e);
        }
    }
    tree
}

fn pretty_json(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

/// Flatten a [`FileTree`] back to `path -> contents`.
pub fn tree_to_template(tree: &FileTree) -> BTreeMap<String, String> {
    tree.files()
        .into_iter()
        .map(|(path, contents)| (path, contents.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn as_map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_tree_from_template_strings() {
        let files = as_map(json!({
            "package.json": "{\"name\":\"demo\"}",
            "src/app/page.tsx": "export default 1;"
        }));
        let tree = tree_from_template(&files);
        assert_eq!(tree.read_file("package.json"), Some("{\"name\":\"demo\"}"));
        assert_eq!(tree.read_file("src/app/page.tsx"), Some("export default 1;"));
    }

    #[test]
    fn test_tree_from_template_binary_and_other_values() {
        let files = as_map(json!({
            "public/logo.png": {"binary": "iVBORw0KGgo="},
            "config/settings.json": {"port": 3000}
        }));
        let tree = tree_from_template(&files);
        assert_eq!(tree.read_file("public/logo.png"), Some("iVBORw0KGgo="));
        assert_eq!(
            tree.read_file("config/settings.json"),
            Some("{\n  \"port\": 3000\n}")
        );
    }

    #[test]
    fn test_tree_to_template_flattens_paths() {
        let mut tree = FileTree::new();
        tree.insert_file("src/index.ts", "main").unwrap();
        tree.insert_file("README.md", "hi").unwrap();

        let flat = tree_to_template(&tree);
        let expected: BTreeMap<String, String> = [
            ("README.md".to_string(), "hi".to_string()),
            ("src/index.ts".to_string(), "main".to_string()),
        ]
        .into_iter()
        .collect();
        assert_eq!(flat, expected);
    }

    #[test]
    fn test_template_round_trip_preserves_tree() {
        let files = as_map(json!({"a/b/c.ts": "c", "a/d.ts": "d"}));
        let tree = tree_from_template(&files);
        let flat = tree_to_template(&tree);
        assert_eq!(flat.len(), 2);
        assert_eq!(flat["a/b/c.ts"], "c");
    }
}
