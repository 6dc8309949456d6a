use super::{hash_str, EMPTY_HASH};

/// Merkle root over an ordered list of hex hashes.
///
/// Adjacent pairs are hashed left to right as `sha256(left ++ right)` over
/// their hex text; an unpaired last element is paired with itself. Levels are
/// folded until one hash remains. An empty list yields [`EMPTY_HASH`] and a
/// single element is returned unchanged.
pub fn merkle_root<S: AsRef<str>>(hashes: &[S]) -> String {
    if hashes.is_empty() {
        return EMPTY_HASH.to_string();
    }

    let mut level: Vec<String> = hashes.iter().map(|h| h.as_ref().to_string()).collect();
    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|pair| {
                let left = &pair[0];
                let right = pair.get(1).unwrap_or(left);
                hash_str(&format!("{left}{right}"))
            })
            .collect();
    }
    level.swap_remove(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_is_hash_of_empty_string() {
        let none: [&str; 0] = [];
        assert_eq!(merkle_root(&none), hash_str(""));
    }

    #[test]
    fn single_element_is_returned_unchanged() {
        let h = hash_str("only");
        assert_eq!(merkle_root(&[h.clone()]), h);
    }

    #[test]
    fn two_elements_hash_concatenation() {
        let a = hash_str("a");
        let b = hash_str("b");
        assert_eq!(merkle_root(&[&a, &b]), hash_str(&format!("{a}{b}")));
    }

    #[test]
    fn odd_element_pairs_with_itself() {
        let a = hash_str("a");
        let b = hash_str("b");
        let c = hash_str("c");
        let ab = hash_str(&format!("{a}{b}"));
        let cc = hash_str(&format!("{c}{c}"));
        assert_eq!(merkle_root(&[&a, &b, &c]), hash_str(&format!("{ab}{cc}")));
    }

    #[test]
    fn order_sensitive() {
        let a = hash_str("a");
        let b = hash_str("b");
        assert_ne!(merkle_root(&[&a, &b]), merkle_root(&[&b, &a]));
    }
}
