//! Synthetic record sets for the benches.

use ingest::{Record, RecordKind, parse_records};
use serde_json::{Value, json};

fn hosts(count: usize, prefix: char, first_seen: i64) -> Vec<Value> {
    (0..count)
        .map(|i| {
            // Every fourth host reuses another host's name.
            let name = if i % 4 == 0 {
                format!("host-{}", i / 4)
            } else {
                format!("host-{i}")
            };
            json!({
                "entityId": format!("HOST-{prefix}{i:015X}"),
                "displayName": name,
                "firstSeenTms": first_seen + i as i64,
                "properties": {
                    "macAddresses": [format!("00:00:00:00:{:02X}:{:02X}", i / 256 % 256, i % 256)],
                    "hostGroupName": format!("group-{}", i % 16)
                }
            })
        })
        .collect()
}

/// `count` hosts per side with overlapping names and host groups.
pub fn host_sets(count: usize) -> (RecordKind, Vec<Record>, Vec<Record>) {
    let kind = RecordKind::for_type("HOST", true);
    let source = parse_records(hosts(count, 'A', 0), &kind, None).expect("valid source hosts");
    let target = parse_records(hosts(count, 'B', 1_000), &kind, None).expect("valid target hosts");
    (kind, source, target)
}
