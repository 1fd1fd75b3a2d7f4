/*!
 * Process Matching
 * Name and command-line predicates shared by the oracle and the termination engine
 */

use crate::core::limits::MAX_COMM_LENGTH;
use crate::core::types::ProcessEntry;

/// Whether a process-table name refers to the wanted process name
///
/// Kernel comm names are cut at 15 characters, so a truncated comm matches
/// any longer name it prefixes.
pub fn name_matches(comm: &str, wanted: &str) -> bool {
    comm == wanted
        || (comm.len() == MAX_COMM_LENGTH
            && wanted.len() > MAX_COMM_LENGTH
            && wanted.starts_with(comm))
}

/// Whether a command line carries the app-mode marker for `url`
pub fn has_app_url(cmdline: &str, marker: &str, url: &str) -> bool {
    if marker.is_empty() || url.is_empty() {
        return false;
    }
    cmdline
        .split_whitespace()
        .filter_map(|arg| arg.strip_prefix(marker))
        .any(|value| value.trim_matches('"') == url || value.contains(url))
}

/// Live instances of `name`
pub fn instances_of<'a: 'b, 'b>(
    snapshot: &'a [ProcessEntry],
    name: &'b str,
) -> impl Iterator<Item = &'a ProcessEntry> + 'b {
    snapshot
        .iter()
        .filter(move |entry| !entry.zombie && name_matches(&entry.name, name))
}
