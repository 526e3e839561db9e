//! The legacy json node format
//!
//! Before the binary encoding, nodes were stored as json:
//!
//! - a leaf is the weight as a json integer literal, usually quoted: `"100"`
//! - a branch is an array of children: `[{"Index":"YmFy","Acc":"100"}]`, where the index is
//!   base64 encoded.
//!
//! Field names are matched case insensitively, and weights are accepted both quoted and as bare
//! numbers, since both forms exist in old data. Writing always produces the quoted form.
use crate::{
    error::Error,
    node::{Branch, Child, Leaf, Weight},
};
use serde_json::{json, Map, Value};

/// decode a legacy leaf stored under `key`
pub fn decode_leaf(key: &[u8], bytes: &[u8]) -> Result<Leaf, Error> {
    let value: Value = serde_json::from_slice(bytes).map_err(|e| Error::malformed(key, e))?;
    let weight = weight_from_json(key, &value)?;
    Ok(Leaf::new(key, weight))
}

/// decode a legacy branch stored under the storage key `key`
pub fn decode_branch(key: &[u8], bytes: &[u8]) -> Result<Branch, Error> {
    let value: Value = serde_json::from_slice(bytes).map_err(|e| Error::malformed(key, e))?;
    let items = match value {
        Value::Array(items) => items,
        _ => return Err(Error::malformed(key, "expected legacy branch array")),
    };
    let children = items
        .iter()
        .map(|item| match item {
            Value::Object(fields) => {
                let index = match field(fields, "index") {
                    Some(Value::String(text)) => {
                        base64::decode(text).map_err(|e| Error::malformed(key, e))?
                    }
                    // a nil byte slice
                    Some(Value::Null) => Vec::new(),
                    _ => return Err(Error::malformed(key, "expected legacy child index")),
                };
                let accumulation = match field(fields, "acc") {
                    Some(acc) => weight_from_json(key, acc)?,
                    None => return Err(Error::malformed(key, "expected legacy child acc")),
                };
                Ok(Child::new(index, accumulation))
            }
            _ => Err(Error::malformed(key, "expected legacy child")),
        })
        .collect::<Result<Vec<_>, Error>>()?;
    let branch = Branch::new(children);
    if branch.children.is_empty() {
        return Err(Error::malformed(key, "legacy branch without children"));
    }
    if !branch.is_sorted() {
        return Err(Error::malformed(key, "legacy branch children not sorted"));
    }
    Ok(branch)
}

/// encode a leaf in the legacy format
pub fn encode_leaf(leaf: &Leaf) -> Result<Vec<u8>, Error> {
    Ok(serde_json::to_vec(&Value::String(leaf.weight.to_string()))?)
}

/// encode a branch in the legacy format
pub fn encode_branch(branch: &Branch) -> Result<Vec<u8>, Error> {
    let children = branch
        .children
        .iter()
        .map(|child| {
            json!({
                "Index": base64::encode(&child.index),
                "Acc": child.accumulation.to_string(),
            })
        })
        .collect::<Vec<_>>();
    Ok(serde_json::to_vec(&Value::Array(children))?)
}

fn field<'a>(fields: &'a Map<String, Value>, name: &str) -> Option<&'a Value> {
    fields
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v)
}

fn weight_from_json(key: &[u8], value: &Value) -> Result<Weight, Error> {
    let text = match value {
        Value::String(text) => text.clone(),
        Value::Number(number) => number.to_string(),
        _ => return Err(Error::malformed(key, "expected legacy weight")),
    };
    text.parse::<Weight>()
        .map_err(|e| Error::malformed(key, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn w(x: u64) -> Weight {
        Weight::from(x)
    }

    #[test]
    fn decode_historical_leaf() {
        assert_eq!(decode_leaf(b"foo", br#""100""#).unwrap().weight, w(100));
        assert_eq!(decode_leaf(b"foo", b"100").unwrap().weight, w(100));
        assert_eq!(decode_leaf(b"foo", br#""0""#).unwrap().weight, w(0));
        let big = "123456789012345678901234567890123456789";
        assert_eq!(
            decode_leaf(b"foo", big.as_bytes()).unwrap().weight,
            big.parse::<Weight>().unwrap()
        );
    }

    #[test]
    fn decode_historical_branch() {
        let bytes = br#"[{"Index":"YmFy","Acc":"100"},{"Index":"Zm9v","Acc":"250"}]"#;
        let branch = decode_branch(b"node/\x00\x01bar", bytes).unwrap();
        assert_eq!(
            branch.children,
            vec![
                Child::new(b"bar".to_vec(), w(100)),
                Child::new(b"foo".to_vec(), w(250))
            ]
        );
        // lower case field names, bare numbers and a nil index
        let bytes = br#"[{"index":null,"acc":7},{"index":"YQ==","acc":1}]"#;
        let branch = decode_branch(b"k", bytes).unwrap();
        assert_eq!(branch.children[0], Child::new(Vec::new(), w(7)));
        assert_eq!(branch.children[1], Child::new(b"a".to_vec(), w(1)));
    }

    #[test]
    fn decode_rejects_garbage() {
        let malformed = |r: Result<Branch, Error>| matches!(r, Err(Error::MalformedEncoding { .. }));
        assert!(malformed(decode_branch(b"k", b"")));
        assert!(malformed(decode_branch(b"k", b"[]")));
        assert!(malformed(decode_branch(b"k", br#""100""#)));
        assert!(malformed(decode_branch(b"k", br#"[{"Index":"!!","Acc":"1"}]"#)));
        assert!(malformed(decode_branch(b"k", br#"[{"Index":"YQ=="}]"#)));
        assert!(malformed(decode_branch(
            b"k",
            br#"[{"Index":"Yg==","Acc":"1"},{"Index":"YQ==","Acc":"1"}]"#
        )));
        assert!(matches!(
            decode_leaf(b"k", br#""-5""#),
            Err(Error::MalformedEncoding { .. })
        ));
        assert!(matches!(
            decode_leaf(b"k", br#"[]"#),
            Err(Error::MalformedEncoding { .. })
        ));
    }

    #[test]
    fn encode_matches_historical_format() {
        let branch = Branch::new(vec![Child::new(b"bar".to_vec(), w(100))]);
        assert_eq!(
            encode_branch(&branch).unwrap(),
            br#"[{"Acc":"100","Index":"YmFy"}]"#.to_vec()
        );
        let leaf = Leaf::new(b"bar".to_vec(), w(100));
        assert_eq!(encode_leaf(&leaf).unwrap(), br#""100""#.to_vec());
        assert_eq!(decode_branch(b"k", &encode_branch(&branch).unwrap()).unwrap(), branch);
    }
}
