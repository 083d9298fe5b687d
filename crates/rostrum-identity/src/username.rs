/// Username candidate for an email address: the part before the first `@`, or the whole
/// string when there is none.
pub fn derive_candidate(email: &str) -> String {
    email
        .split_once('@')
        .map_or(email, |(local, _)| local)
        .to_string()
}

/// `base` for attempt 0, then `base1`, `base2`, ...
pub fn candidate_with_suffix(base: &str, n: u64) -> String {
    if n == 0 {
        base.to_string()
    } else {
        format!("{base}{n}")
    }
}

/// First free name in the sequence `candidate`, `candidate1`, `candidate2`, ...
///
/// Each probe that comes back taken consumes a distinct existing name, so this stops
/// after at most `|existing| + 1` probes. The answer is only a hint: another request can
/// claim the same name before the caller inserts it, which the caller must detect through
/// the store's uniqueness constraint.
pub fn allocate_unique<E>(
    candidate: &str,
    mut is_taken: impl FnMut(&str) -> Result<bool, E>,
) -> Result<String, E> {
    let mut n = 0;
    loop {
        let name = candidate_with_suffix(candidate, n);
        if !is_taken(&name)? {
            return Ok(name);
        }
        n += 1;
    }
}
