//! Resolver for the indexed JSON graph embedded in item pages.
//!
//! Item pages carry a single `<script type="application/json">` holding a
//! flat array. Integers inside that array are indices into the array itself:
//! list elements that are non-negative integers point at other entries, and
//! object values are always pointers. Resolving an object inlines everything
//! it points at, recursively.
//!
//! ```
//! use moviebox_dl::resolver::resolve;
//! use serde_json::json;
//!
//! let raw = json!([{"state": 1}, [0, 2], {"^$title": 3}, "Titanic"]);
//! let doc = resolve(raw.as_array().unwrap()).unwrap();
//! assert_eq!(doc.details()["title"], "Titanic");
//! ```

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::error::{Error, Result};

static JSON_SCRIPT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<script\b[^>]*\btype\s*=\s*["']application/json["'][^>]*>(.*?)</script>"#)
        .expect("valid regex")
});

/// Number of sigil characters prefixing every key of the details mapping.
const DETAILS_KEY_PREFIX_LEN: usize = 2;

/// Body of the page's `<script type="application/json">` tag.
///
/// # Errors
///
/// Returns [`Error::Extraction`] when the page has no such tag, which
/// usually means a block or error page was served.
pub fn extract_json_script(html: &str) -> Result<&str> {
    JSON_SCRIPT
        .captures(html)
        .and_then(|captures| captures.get(1))
        .map(|body| body.as_str().trim())
        .ok_or_else(|| Error::Extraction("page has no embedded application/json script".into()))
}

/// Pointers followed per extract before resolution is abandoned, at least.
const MIN_NODE_BUDGET: usize = 1 << 20;

/// Pointers followed per extract, per raw entry.
const NODES_PER_ENTRY: usize = 64;

/// Resolves pointers within one raw entry array.
#[derive(Debug, Clone, Copy)]
pub struct Resolver<'a> {
    raw: &'a [Value],
}

/// State of one extract's resolution.
struct Walk {
    /// Indices currently being resolved, outermost first.
    path: Vec<usize>,
    /// Entries whose resolution never hit an ancestor, with the number of
    /// pointers followed to build them.
    resolved: HashMap<usize, (Value, usize)>,
    followed: usize,
    budget: usize,
    cycle_hits: usize,
}

impl Walk {
    fn new(root: usize, entries: usize) -> Self {
        Self {
            path: vec![root],
            resolved: HashMap::new(),
            followed: 0,
            budget: entries.saturating_mul(NODES_PER_ENTRY).max(MIN_NODE_BUDGET),
            cycle_hits: 0,
        }
    }

    fn charge(&mut self, pointers: usize) -> Result<()> {
        self.followed = self.followed.saturating_add(pointers);
        if self.followed > self.budget {
            return Err(Error::Extraction(format!(
                "entry array expands past {} pointers; refusing to inline it",
                self.budget
            )));
        }
        Ok(())
    }
}

impl<'a> Resolver<'a> {
    /// Creates a resolver over `raw`. The array is never modified.
    #[must_use]
    pub const fn new(raw: &'a [Value]) -> Self {
        Self { raw }
    }

    /// Lazily expands every top-level object entry, in array order.
    pub fn extracts(self) -> impl Iterator<Item = Result<Map<String, Value>>> + 'a {
        self.raw.iter().enumerate().filter_map(move |(index, entry)| {
            entry.as_object().map(|object| {
                self.expand_object(object, &mut Walk::new(index, self.raw.len()))
            })
        })
    }

    fn expand_object(&self, object: &Map<String, Value>, walk: &mut Walk) -> Result<Map<String, Value>> {
        let mut expanded = Map::with_capacity(object.len());
        for (key, pointer) in object {
            let value = match object_pointer(key, pointer)? {
                Some(index) => self.dereference(index, walk)?,
                None => Value::Null,
            };
            expanded.insert(key.clone(), value);
        }
        Ok(expanded)
    }

    fn resolve_value(&self, value: &Value, walk: &mut Walk) -> Result<Value> {
        match value {
            Value::Array(items) => items
                .iter()
                .map(|item| match list_pointer(item) {
                    Some(index) => self.dereference(index, walk),
                    None => Ok(item.clone()),
                })
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
            Value::Object(object) => self.expand_object(object, walk).map(Value::Object),
            scalar => Ok(scalar.clone()),
        }
    }

    fn dereference(&self, index: usize, walk: &mut Walk) -> Result<Value> {
        walk.charge(1)?;
        if walk.path.contains(&index) {
            log::debug!("Index {index} points back at an ancestor; resolving it to null");
            walk.cycle_hits += 1;
            return Ok(Value::Null);
        }
        if let Some(pointers) = walk.resolved.get(&index).map(|(_, pointers)| *pointers) {
            walk.charge(pointers)?;
            if let Some((value, _)) = walk.resolved.get(&index) {
                return Ok(value.clone());
            }
        }
        let target = self.raw.get(index).ok_or_else(|| {
            Error::Extraction(format!(
                "index {index} is outside the entry array of length {}",
                self.raw.len()
            ))
        })?;

        let (followed_before, cycles_before) = (walk.followed, walk.cycle_hits);
        walk.path.push(index);
        let resolved = self.resolve_value(target, walk);
        walk.path.pop();
        let resolved = resolved?;
        // A value that met an ancestor depends on the path it was reached by.
        if walk.cycle_hits == cycles_before {
            walk.resolved
                .insert(index, (resolved.clone(), walk.followed - followed_before));
        }
        Ok(resolved)
    }
}

fn list_pointer(item: &Value) -> Option<usize> {
    item.as_u64().and_then(|n| usize::try_from(n).ok())
}

/// Object values must be integers; negative ones mark absent values.
fn object_pointer(key: &str, value: &Value) -> Result<Option<usize>> {
    if let Some(index) = list_pointer(value) {
        return Ok(Some(index));
    }
    if value.as_i64().is_some() {
        return Ok(None);
    }
    Err(Error::Extraction(format!(
        "object value for key '{key}' is not an index: {value}"
    )))
}

/// Expands every top-level object of `raw`.
///
/// # Errors
///
/// Returns [`Error::Extraction`] if `raw` holds no object or a pointer is
/// malformed.
pub fn resolve_all(raw: &[Value]) -> Result<Vec<Map<String, Value>>> {
    let extracts = Resolver::new(raw).extracts().collect::<Result<Vec<_>>>()?;
    if extracts.is_empty() {
        return Err(Error::Extraction("entry array holds no object".into()));
    }
    Ok(extracts)
}

/// Resolves `raw` into its canonical document: the first extract and the
/// `details` mapping found at `state[1]`.
///
/// # Errors
///
/// Returns [`Error::Extraction`] if `raw` holds no object, a pointer is
/// malformed, or the first extract lacks the `state` entry.
pub fn resolve(raw: &[Value]) -> Result<DereferencedDocument> {
    let extract = Resolver::new(raw)
        .extracts()
        .next()
        .ok_or_else(|| Error::Extraction("entry array holds no object".into()))??;
    DereferencedDocument::from_extract(extract)
}

/// Fully resolved item page data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DereferencedDocument {
    extract: Map<String, Value>,
    details: Map<String, Value>,
}

impl DereferencedDocument {
    /// Extracts, parses and resolves the embedded JSON of an item page.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Extraction`] if the page lacks the script or its
    /// content has an unexpected shape, or [`Error::Json`] if the script
    /// body is not valid JSON.
    pub fn from_html(html: &str) -> Result<Self> {
        let raw: Value = serde_json::from_str(extract_json_script(html)?)?;
        let entries = raw
            .as_array()
            .ok_or_else(|| Error::Extraction("embedded JSON is not an array".into()))?;
        resolve(entries)
    }

    fn from_extract(extract: Map<String, Value>) -> Result<Self> {
        let state = extract
            .get("state")
            .and_then(Value::as_array)
            .ok_or_else(|| Error::Extraction("first extract has no 'state' list".into()))?;
        let details = state
            .get(1)
            .and_then(Value::as_object)
            .ok_or_else(|| Error::Extraction("'state' has no mapping at position 1".into()))?
            .iter()
            .map(|(key, value)| (strip_prefix(key).to_string(), value.clone()))
            .collect();
        Ok(Self { extract, details })
    }

    /// The first resolved extract, untouched.
    #[must_use]
    pub const fn extract(&self) -> &Map<String, Value> {
        &self.extract
    }

    /// The `details` mapping with key prefixes stripped.
    #[must_use]
    pub const fn details(&self) -> &Map<String, Value> {
        &self.details
    }

    /// Consumes the document, returning `details`.
    #[must_use]
    pub fn into_details(self) -> Map<String, Value> {
        self.details
    }
}

fn strip_prefix(key: &str) -> &str {
    key.char_indices()
        .nth(DETAILS_KEY_PREFIX_LEN)
        .map_or("", |(at, _)| &key[at..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn entries(value: Value) -> Vec<Value> {
        match value {
            Value::Array(items) => items,
            other => panic!("not an array: {other}"),
        }
    }

    #[test]
    fn details_are_inlined_and_unprefixed() {
        let raw = entries(json!([
            {"state": 1},
            [0, 2],
            {"^$title": 3, "^$year": 4},
            "X",
            1999
        ]));
        let doc = resolve(&raw).unwrap();
        assert_eq!(Value::Object(doc.details().clone()), json!({"title": "X", "year": 1999}));
        // state[0] pointed back at the root extract.
        assert_eq!(doc.extract()["state"][0], Value::Null);
    }

    #[test]
    fn referenced_objects_leave_no_indices_behind() {
        let raw = entries(json!([
            {"a": 1, "b": 4},
            {"name": 2, "tags": 3},
            "B",
            ["literal", 2, true],
            5.5
        ]));
        let all = resolve_all(&raw).unwrap();
        assert_eq!(
            Value::Object(all[0].clone()),
            json!({"a": {"name": "B", "tags": ["literal", "B", true]}, "b": 5.5})
        );
        assert_eq!(Value::Object(all[1].clone()), json!({"name": "B", "tags": ["literal", "B", true]}));
    }

    /// `[{"root": 1}, [2, 2], [3, 3], ..., "leaf"]`: every level points
    /// twice at the next one, so the inlined tree doubles per level.
    fn doubling_chain(levels: usize) -> Vec<Value> {
        let mut raw = vec![json!({"root": 1})];
        raw.extend((1..levels).map(|i| json!([i + 1, i + 1])));
        raw.push(json!("leaf"));
        raw
    }

    fn count_leaves(value: &Value) -> usize {
        match value {
            Value::Array(items) => items.iter().map(count_leaves).sum(),
            Value::Object(object) => object.values().map(count_leaves).sum(),
            _ => 1,
        }
    }

    #[test]
    fn shared_entries_are_inlined_everywhere() {
        let all = resolve_all(&doubling_chain(8)).unwrap();
        assert_eq!(count_leaves(&all[0]["root"]), 1 << 7);
    }

    #[test]
    fn exploding_shared_chain_is_refused_quickly() {
        let started = std::time::Instant::now();
        let result = resolve_all(&doubling_chain(25));
        assert!(matches!(result, Err(Error::Extraction(_))));
        assert!(started.elapsed() < std::time::Duration::from_secs(5));
    }

    #[test]
    fn values_cut_by_a_cycle_depend_on_their_route() {
        // 1 and 2 point at each other; each route truncates at a different node.
        let raw = entries(json!([{"a": 1, "b": 2}, {"x": 2}, {"y": 1}]));
        let all = resolve_all(&raw).unwrap();
        assert_eq!(all[0]["a"], json!({"x": {"y": null}}));
        assert_eq!(all[0]["b"], json!({"y": {"x": null}}));
    }

    #[test]
    fn negative_list_integers_are_literals() {
        let raw = entries(json!([{"v": 1}, [-1, 2], "x"]));
        let all = resolve_all(&raw).unwrap();
        assert_eq!(all[0]["v"], json!([-1, "x"]));
    }

    #[test]
    fn negative_object_values_are_null() {
        let raw = entries(json!([{"v": -1, "w": 1}, "x"]));
        let all = resolve_all(&raw).unwrap();
        assert_eq!(Value::Object(all[0].clone()), json!({"v": null, "w": "x"}));
    }

    #[test]
    fn non_integer_object_value_fails() {
        let raw = entries(json!([{"v": "x"}]));
        assert!(matches!(resolve_all(&raw), Err(Error::Extraction(_))));
    }

    #[test]
    fn out_of_range_index_fails() {
        let raw = entries(json!([{"v": 9}]));
        assert!(matches!(resolve_all(&raw), Err(Error::Extraction(_))));
    }

    #[test]
    fn array_without_objects_fails() {
        let raw = entries(json!(["a", 1, [0]]));
        assert!(matches!(resolve(&raw), Err(Error::Extraction(_))));
        assert!(matches!(resolve_all(&raw), Err(Error::Extraction(_))));
    }

    #[test]
    fn self_reference_resolves_to_null() {
        let raw = entries(json!([{"me": 1}, {"parent": 1, "up": 0}]));
        let all = resolve_all(&raw).unwrap();
        assert_eq!(all[0]["me"], json!({"parent": null, "up": null}));
        assert_eq!(all[1]["up"], json!({"me": null}));
    }

    #[test]
    fn missing_state_fails() {
        let raw = entries(json!([{"other": 1}, "x"]));
        assert!(matches!(resolve(&raw), Err(Error::Extraction(_))));
    }

    #[test]
    fn extracts_are_lazy() {
        // The second object is malformed but never expanded.
        let raw = entries(json!([{"state": 1}, [0, 2], {"^$a": 3}, "x", {"bad": "x"}]));
        assert!(resolve(&raw).is_ok());
        assert!(resolve_all(&raw).is_err());
    }

    #[test]
    fn script_is_found_in_page() {
        let html = r#"<html><head><script src="a.js"></script>
            <script type="application/json" id="__NUXT_DATA__" data-ssr="true">[{"state":1},[0,2],{"^$title":3},"Avatar"]</script>
            </head></html>"#;
        let doc = DereferencedDocument::from_html(html).unwrap();
        assert_eq!(doc.into_details()["title"], "Avatar");
    }

    #[test]
    fn page_without_script_fails() {
        let html = "<html><body>Access denied</body></html>";
        assert!(matches!(extract_json_script(html), Err(Error::Extraction(_))));
        assert!(matches!(DereferencedDocument::from_html(html), Err(Error::Extraction(_))));
    }

    #[test]
    fn prefix_strip_counts_characters() {
        assert_eq!(strip_prefix("^$title"), "title");
        assert_eq!(strip_prefix("éétitle"), "title");
        assert_eq!(strip_prefix("x"), "");
    }

    fn arb_entry(len: usize) -> impl Strategy<Value = Value> {
        let index = 0..len as u64;
        prop_oneof![
            any::<i16>().prop_map(Value::from),
            "[a-z]{0,4}".prop_map(Value::from),
            any::<bool>().prop_map(Value::from),
            prop::collection::vec(
                prop_oneof![index.clone().prop_map(Value::from), "[a-z]{1,3}".prop_map(Value::from)],
                0..3
            )
            .prop_map(Value::Array),
            prop::collection::btree_map("[a-z]{1,3}", index, 0..3).prop_map(|map| {
                Value::Object(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }),
        ]
    }

    proptest! {
        #[test]
        fn resolving_twice_gives_equal_results(raw in (1usize..7).prop_flat_map(|len| prop::collection::vec(arb_entry(len), len))) {
            let first = resolve_all(&raw);
            let second = resolve_all(&raw);
            match (first, second) {
                (Ok(a), Ok(b)) => prop_assert_eq!(a, b),
                (Err(_), Err(_)) => {}
                (a, b) => prop_assert!(false, "diverging results: {:?} vs {:?}", a, b),
            }
        }
    }
}
