//! Small readers for entity configuration blocks.

use glam::Vec3;
use serde_json::Value;

pub(crate) fn vec3(json: &Value, key: &str) -> Option<Vec3> {
    match json.get(key)? {
        Value::Array(items) if items.len() >= 3 => {
            let mut out = [0.0f32; 3];
            for (slot, item) in out.iter_mut().zip(items) {
                *slot = item.as_f64()? as f32;
            }
            Some(Vec3::from_array(out))
        }
        Value::Number(n) => n.as_f64().map(|v| Vec3::splat(v as f32)),
        _ => None,
    }
}

pub(crate) fn f32(json: &Value, key: &str) -> Option<f32> {
    json.get(key)?.as_f64().map(|v| v as f32)
}

pub(crate) fn bool(json: &Value, key: &str) -> Option<bool> {
    match json.get(key)? {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|v| v != 0.0),
        _ => None,
    }
}

pub(crate) fn string<'a>(json: &'a Value, key: &str) -> Option<&'a str> {
    json.get(key)?.as_str()
}
