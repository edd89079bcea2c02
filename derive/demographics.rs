//! Demographic code tables.

/// Maps raw survey codes to analysis levels. Codes in `sentinels` are the
/// instrument's declared missing values; any other code without an entry
/// is unmapped. Both come back as `None`.
#[derive(Debug, Clone, Copy)]
pub struct CodeTable {
    pub name: &'static str,
    entries: &'static [(i64, u8)],
    sentinels: &'static [i64],
}

const SENTINELS: &[i64] = &[-9, -8, -7, -1, 77, 88, 99];

pub const GENDER: CodeTable = CodeTable {
    name: "gender",
    // male, female, transgender / nonbinary / other
    entries: &[(1, 1), (2, 2), (3, 3), (4, 3), (5, 3)],
    sentinels: SENTINELS,
};

pub const RACE: CodeTable = CodeTable {
    name: "race",
    // white, Black, Hispanic, Asian / multiracial / other
    entries: &[(1, 1), (2, 2), (3, 3), (4, 4), (5, 4), (6, 4)],
    sentinels: SENTINELS,
};

pub const REGION: CodeTable = CodeTable {
    name: "region",
    entries: &[(1, 1), (2, 2), (3, 3), (4, 4)],
    sentinels: SENTINELS,
};

pub const URBAN: CodeTable = CodeTable {
    name: "urban",
    // urban = 1, rural = 2 on the instrument
    entries: &[(1, 1), (2, 0)],
    sentinels: SENTINELS,
};

impl CodeTable {
    pub fn recode(&self, raw: Option<i64>) -> Option<u8> {
        let code = raw?;
        if self.sentinels.contains(&code) {
            return None;
        }
        let mapped = self
            .entries
            .iter()
            .find_map(|&(from, to)| (from == code).then_some(to));
        if mapped.is_none() {
            log::debug!("Unmapped {} code {code}; recorded as missing", self.name);
        }
        mapped
    }

    /// Distinct analysis levels, ascending.
    pub fn levels(&self) -> Vec<u8> {
        let mut levels: Vec<u8> = self.entries.iter().map(|&(_, to)| to).collect();
        levels.sort_unstable();
        levels.dedup();
        levels
    }

    pub fn is_mapped(&self, raw: Option<i64>) -> bool {
        match raw {
            None => true,
            Some(code) => {
                self.sentinels.contains(&code) || self.entries.iter().any(|&(from, _)| from == code)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tables_collapse_codes_and_drop_sentinels() {
        assert_eq!(GENDER.recode(Some(4)), Some(3));
        assert_eq!(RACE.recode(Some(6)), Some(4));
        assert_eq!(URBAN.recode(Some(2)), Some(0));
        assert_eq!(GENDER.recode(Some(-9)), None);
        assert_eq!(REGION.recode(Some(12)), None);
        assert_eq!(REGION.recode(None), None);
        assert!(GENDER.is_mapped(Some(99)));
        assert!(!REGION.is_mapped(Some(12)));
    }

    #[test]
    fn levels_are_distinct_and_sorted() {
        assert_eq!(GENDER.levels(), vec![1, 2, 3]);
        assert_eq!(RACE.levels(), vec![1, 2, 3, 4]);
        assert_eq!(URBAN.levels(), vec![0, 1]);
    }
}
