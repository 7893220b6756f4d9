//! Statement templates for the fixed `users` table.
//!
//! A [`TableMeta`] describes the column list and partition key once; each
//! builder returns the CQL text together with the ordered bind names, so
//! callers can check their value tuples line up with the `?` markers.

#[derive(Debug, Clone, Copy)]
pub struct Column {
    pub name: &'static str,
    pub cql_type: &'static str,
}

#[derive(Debug, Clone, Copy)]
pub struct TableMeta {
    pub name: &'static str,
    pub columns: &'static [Column],
    pub partition_key: &'static [&'static str],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub cql: String,
    pub names: Vec<&'static str>,
}

pub const USERS: TableMeta = TableMeta {
    name: "users",
    columns: &[
        Column { name: "email", cql_type: "text" },
        Column { name: "password", cql_type: "text" },
        Column { name: "picture", cql_type: "blob" },
        Column { name: "state", cql_type: "boolean" },
        Column { name: "usertype", cql_type: "int" },
    ],
    partition_key: &["email"],
};

impl TableMeta {
    fn column_names(&self) -> Vec<&'static str> {
        self.columns.iter().map(|c| c.name).collect()
    }

    fn key_clause(&self) -> String {
        self.partition_key
            .iter()
            .map(|k| format!("{} = ?", k))
            .collect::<Vec<_>>()
            .join(" AND ")
    }

    pub fn create_table(&self) -> String {
        let cols = self
            .columns
            .iter()
            .map(|c| format!("{} {}", c.name, c.cql_type))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "CREATE TABLE IF NOT EXISTS {} ({}, PRIMARY KEY (({})))",
            self.name,
            cols,
            self.partition_key.join(", ")
        )
    }

    /// Lightweight-transaction insert; the result carries `[applied]`.
    pub fn insert_if_absent(&self) -> Statement {
        let names = self.column_names();
        let marks = vec!["?"; names.len()].join(", ");
        Statement {
            cql: format!(
                "INSERT INTO {} ({}) VALUES ({}) IF NOT EXISTS",
                self.name,
                names.join(", "),
                marks
            ),
            names,
        }
    }

    /// Every column of the row addressed by the partition key.
    pub fn select_by_key(&self) -> Statement {
        Statement {
            cql: format!(
                "SELECT {} FROM {} WHERE {}",
                self.column_names().join(", "),
                self.name,
                self.key_clause()
            ),
            names: self.partition_key.to_vec(),
        }
    }

    /// Full scan; filtering by non-key columns happens client side.
    pub fn select_all(&self) -> Statement {
        Statement {
            cql: format!("SELECT {} FROM {}", self.column_names().join(", "), self.name),
            names: Vec::new(),
        }
    }

    /// `UPDATE ... SET <set> WHERE <key> IF EXISTS`; binds the set columns
    /// first. Never creates a row.
    pub fn update_if_exists(&self, set: &[&'static str]) -> Statement {
        let assignments = set
            .iter()
            .map(|c| format!("{} = ?", c))
            .collect::<Vec<_>>()
            .join(", ");
        let mut names = set.to_vec();
        names.extend_from_slice(self.partition_key);
        Statement {
            cql: format!(
                "UPDATE {} SET {} WHERE {} IF EXISTS",
                self.name,
                assignments,
                self.key_clause()
            ),
            names,
        }
    }

    pub fn delete_if_exists(&self) -> Statement {
        Statement {
            cql: format!("DELETE FROM {} WHERE {} IF EXISTS", self.name, self.key_clause()),
            names: self.partition_key.to_vec(),
        }
    }

    pub fn truncate(&self) -> String {
        format!("TRUNCATE {}", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_binds_every_column_in_order() {
        let s = USERS.insert_if_absent();
        assert_eq!(
            s.cql,
            "INSERT INTO users (email, password, picture, state, usertype) \
             VALUES (?, ?, ?, ?, ?) IF NOT EXISTS"
        );
        assert_eq!(s.names, vec!["email", "password", "picture", "state", "usertype"]);
    }

    #[test]
    fn select_by_key_filters_on_partition_key() {
        let s = USERS.select_by_key();
        assert_eq!(
            s.cql,
            "SELECT email, password, picture, state, usertype FROM users WHERE email = ?"
        );
        assert_eq!(s.names, vec!["email"]);
        assert!(USERS.select_all().names.is_empty());
    }

    #[test]
    fn update_puts_key_last() {
        let s = USERS.update_if_exists(&["picture", "state"]);
        assert_eq!(
            s.cql,
            "UPDATE users SET picture = ?, state = ? WHERE email = ? IF EXISTS"
        );
        assert_eq!(s.names, vec!["picture", "state", "email"]);
    }

    #[test]
    fn state_only_update_leaves_picture_alone() {
        let s = USERS.update_if_exists(&["state"]);
        assert_eq!(s.cql, "UPDATE users SET state = ? WHERE email = ? IF EXISTS");
        assert_eq!(s.names, vec!["state", "email"]);
        assert!(!s.cql.contains("picture"));
    }

    #[test]
    fn delete_and_truncate() {
        assert_eq!(
            USERS.delete_if_exists().cql,
            "DELETE FROM users WHERE email = ? IF EXISTS"
        );
        assert_eq!(USERS.truncate(), "TRUNCATE users");
    }

    #[test]
    fn create_table_uses_partition_key() {
        assert_eq!(
            USERS.create_table(),
            "CREATE TABLE IF NOT EXISTS users (email text, password text, picture blob, \
             state boolean, usertype int, PRIMARY KEY ((email)))"
        );
    }

    #[test]
    fn composite_key_joins_with_and() {
        const T: TableMeta = TableMeta {
            name: "t",
            columns: &[
                Column { name: "a", cql_type: "text" },
                Column { name: "b", cql_type: "text" },
                Column { name: "c", cql_type: "int" },
            ],
            partition_key: &["a", "b"],
        };
        assert_eq!(
            T.delete_if_exists().cql,
            "DELETE FROM t WHERE a = ? AND b = ? IF EXISTS"
        );
        assert_eq!(T.update_if_exists(&["c"]).names, vec!["c", "a", "b"]);
    }
}
