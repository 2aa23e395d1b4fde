use anyhow::Result;
use chrono::Utc;

use super::diag::Diagnostics;
use super::parser::{entry_id, RawEntry};
use crate::storage::{Database, NewEntry};
use crate::util::content_hash;

/// Filter already-seen entries and persist the new ones.
///
/// The working set of known `uid_hash` values is seeded from storage once,
/// at the start of the fetch, and grown as entries are written so that
/// duplicates later in the same document are also caught. Concurrent
/// fetches of the same feed are a caller-precondition violation; a race
/// surfaces as a UNIQUE-violation diagnostic, not as corruption.
///
/// Per-entry conditions never abort the loop:
/// - an entry with no identifier is dropped with a diagnostic — it can
///   never be deduplicated or recovered,
/// - an already-seen identifier is skipped silently (expected case),
/// - a failed write is recorded and the remaining entries still process.
///
/// Writes are individual, never batched: one oversized batch can fail
/// atomically and lose every entry of the fetch.
///
/// Returns exactly the newly persisted entries, in parser order — the set
/// handed to the notification bus.
pub async fn ingest(
    db: &Database,
    feed_id: i64,
    fetch_status_id: i64,
    entries: &[RawEntry],
    diag: &mut Diagnostics,
) -> Result<Vec<NewEntry>> {
    let mut seen = db.entry_hashes(feed_id).await?;
    let mut new_entries = Vec::new();

    for (i, entry) in entries.iter().enumerate() {
        let uid = match entry_id(entry) {
            Some(uid) => uid,
            None => {
                diag.push(format!("Entry #{}: no ID can be found.", i));
                continue;
            }
        };

        let uid_hash = content_hash(&uid);
        if seen.contains(&uid_hash) {
            continue;
        }

        let created_at = Utc::now().timestamp_millis();
        match db
            .insert_entry(feed_id, fetch_status_id, &entry.xml, &uid_hash, created_at)
            .await
        {
            Ok(id) => {
                new_entries.push(NewEntry {
                    id,
                    uid_hash: uid_hash.clone(),
                    xml: entry.xml.clone(),
                });
                seen.insert(uid_hash);
            }
            Err(e) => {
                diag.push(format!("Entry #{}: cannot be stored.\n{}", i, e));
            }
        }
    }

    Ok(new_entries)
}
