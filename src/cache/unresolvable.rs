use std::collections::HashSet;

use lazy_static::lazy_static;
use tracing::warn;

use crate::maven::coordinates::Gav;

const BUNDLED: &str = include_str!("unresolvable.txt");

lazy_static! {
    static ref BUNDLED_UNRESOLVABLE: HashSet<Gav> = parse(BUNDLED);
}

/// The bundled list of coordinates known to be unresolvable, used to pre-seed negative entries.
pub fn bundled() -> &'static HashSet<Gav> {
    &BUNDLED_UNRESOLVABLE
}

/// Parses one 'groupId:artifactId:version' per line; blank lines and '#' comments are skipped.
pub fn parse(list: &str) -> HashSet<Gav> {
    list.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| match Gav::parse(line) {
            Ok(gav) => Some(gav),
            Err(e) => {
                warn!("skipping entry in unresolvable list: {:#}", e);
                None
            }
        })
        .collect()
}
