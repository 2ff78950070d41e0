//! Readiness checklist derived from a run's Redis hash.
//!
//! The hash records pipeline stage completion times under `timestamps:*`
//! keys; a stage counts as ready when its timestamp is strictly newer than
//! those of the stages it depends on. Missing or unparseable inputs always
//! evaluate to `false`, never to an error, so the checklist key set is the
//! same for every input.

use std::collections::HashMap;

/// Derive the readiness checklist and the lock statuses from a raw field
/// map. Pure and deterministic; safe to call concurrently.
pub fn evaluate(
    fields: &HashMap<String, String>,
) -> (HashMap<String, bool>, HashMap<String, bool>) {
    let ts_raw = |key: &str| fields.get(&format!("timestamps:{key}")).map(String::as_str);
    let ts = |key: &str| ts_raw(key).and_then(as_int);

    let build_channels = ts("build_channels");
    let abstract_watershed = ts("abstract_watershed");
    let build_landuse = ts("build_landuse");
    let build_soils = ts("build_soils");
    let build_climate = ts("build_climate");
    let build_rangeland_cover = ts("build_rangeland_cover");

    // A watershed-level WEPP run supersedes a plain one when both exist.
    let wepp_run = first_non_empty(&[ts_raw("run_wepp_watershed"), ts_raw("run_wepp")])
        .and_then(as_int);

    // Downstream models must postdate every input they consume.
    let model_inputs_ready =
        |run: Option<i64>| gt(run, build_landuse) && gt(run, build_soils) && gt(run, build_climate);
    let follows_wepp = |key: &str| {
        let run = ts(key);
        model_inputs_ready(run) && gt(run, wepp_run)
    };

    let mut checklist = HashMap::new();
    checklist.insert(
        "sbs_map".to_string(),
        fields.get("attrs:has_sbs").map(String::as_str) == Some("true"),
    );
    checklist.insert(
        "channels".to_string(),
        fields.contains_key("timestamps:build_channels"),
    );
    checklist.insert(
        "outlet".to_string(),
        gt(max_opt(ts("set_outlet"), ts("find_outlet")), build_channels),
    );
    checklist.insert(
        "subcatchments".to_string(),
        gt(abstract_watershed, build_channels),
    );
    checklist.insert("landuse".to_string(), gt(build_landuse, abstract_watershed));
    checklist.insert(
        "rangeland_cover".to_string(),
        ts_raw("build_rangeland_cover").is_some_and(|v| !v.is_empty()),
    );
    checklist.insert(
        "soils".to_string(),
        gt(build_soils, abstract_watershed)
            && (gt(build_soils, build_landuse) || gt(build_soils, build_rangeland_cover)),
    );
    checklist.insert("climate".to_string(), gt(build_climate, abstract_watershed));
    checklist.insert("rap_ts".to_string(), gt(ts("build_rap_ts"), build_climate));
    checklist.insert("wepp".to_string(), model_inputs_ready(wepp_run));
    checklist.insert("observed".to_string(), follows_wepp("run_observed"));
    checklist.insert("debris".to_string(), follows_wepp("run_debris"));
    checklist.insert("watar".to_string(), follows_wepp("run_watar"));
    checklist.insert(
        "omni_scenarios".to_string(),
        gt(ts("run_omni_scenarios"), wepp_run),
    );
    checklist.insert(
        "rhem".to_string(),
        ts_raw("run_rhem").is_some_and(|v| !v.is_empty()),
    );
    checklist.insert("dss_export".to_string(), gt(ts("dss_export"), wepp_run));

    let mut lock_statuses = HashMap::new();
    for (key, value) in fields {
        if let Some(name) = key.strip_prefix("locked:") {
            lock_statuses.insert(name.to_string(), value == "true");
        }
    }

    (checklist, lock_statuses)
}

/// Explicit `last_modified` when it parses, otherwise the newest value
/// across all `timestamps:*` fields.
pub fn extract_last_modified(fields: &HashMap<String, String>) -> Option<i64> {
    if let Some(explicit) = fields.get("last_modified").and_then(|v| as_int(v)) {
        return Some(explicit);
    }
    fields
        .iter()
        .filter(|(key, _)| key.starts_with("timestamps:"))
        .filter_map(|(_, value)| as_int(value))
        .max()
}

fn as_int(value: &str) -> Option<i64> {
    value.parse().ok()
}

fn gt(a: Option<i64>, b: Option<i64>) -> bool {
    matches!((a, b), (Some(a), Some(b)) if a > b)
}

fn max_opt(a: Option<i64>, b: Option<i64>) -> Option<i64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (Some(a), None) => Some(a),
        (None, b) => b,
    }
}

fn first_non_empty<'a>(candidates: &[Option<&'a str>]) -> Option<&'a str> {
    candidates
        .iter()
        .filter_map(|candidate| *candidate)
        .find(|value| !value.is_empty())
}
