//! CLI integration tests
//!
//! Tests for the dynsql command-line interface.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

const MAPPER: &str = r#"<mapper namespace="user">
  <select id="findUser">
    SELECT * FROM users
    <where><if test="id">AND id = #{id}</if></where>
  </select>
  <delete id="removeUser">DELETE FROM users WHERE id = #{0}</delete>
</mapper>
"#;

const TEMPLATES: &str = r#"{{#*inline "countUsers"}}SELECT COUNT(*) FROM users WHERE active = {{arg active}}{{/inline}}
"#;

fn dynsql() -> Command {
    Command::cargo_bin("dynsql").unwrap()
}

mod check_command {
    use super::*;

    #[test]
    fn check_clean_files_exits_0() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("users.xml"), MAPPER).unwrap();
        fs::write(temp.path().join("users.hbs"), TEMPLATES).unwrap();

        dynsql()
            .arg("check")
            .arg(temp.path())
            .assert()
            .success()
            .stdout(predicate::str::contains("3 statement(s) ok"));
    }

    #[test]
    fn check_rejected_statement_exits_1() {
        let temp = TempDir::new().unwrap();
        let file_path = temp.path().join("bad.xml");
        fs::write(
            &file_path,
            r#"<mapper namespace="n"><select id="broken">SELECT #{id</select></mapper>"#,
        )
        .unwrap();

        dynsql()
            .arg("check")
            .arg(&file_path)
            .assert()
            .code(1)
            .stderr(predicate::str::contains("broken"));
    }

    #[test]
    fn check_duplicate_across_files_exits_1() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a.xml"), MAPPER).unwrap();
        fs::write(temp.path().join("b.xml"), MAPPER).unwrap();

        dynsql()
            .arg("check")
            .arg(temp.path())
            .assert()
            .code(1)
            .stderr(predicate::str::contains("already registered"));
    }

    #[test]
    fn check_malformed_document_exits_2() {
        let temp = TempDir::new().unwrap();
        let file_path = temp.path().join("broken.xml");
        fs::write(&file_path, "<mapper><select id=\"a\">").unwrap();

        dynsql().arg("check").arg(&file_path).assert().code(2);
    }

    #[test]
    fn check_syntax_error_points_at_line() {
        let temp = TempDir::new().unwrap();
        let file_path = temp.path().join("stray.hbs");
        fs::write(&file_path, "\n\nSELECT 1").unwrap();

        dynsql()
            .arg("check")
            .arg(&file_path)
            .assert()
            .code(2)
            .stderr(predicate::str::contains("line 3, column 1"))
            .stderr(predicate::str::contains("SELECT 1"));
    }

    #[test]
    fn check_glob_pattern_skips_other_files() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("users.xml"), MAPPER).unwrap();
        fs::write(temp.path().join("notes.txt"), "not a mapper").unwrap();

        dynsql()
            .arg("check")
            .arg(temp.path().join("*"))
            .assert()
            .success()
            .stdout(predicate::str::contains("2 statement(s) ok"));
    }

    #[test]
    fn check_requires_paths() {
        dynsql().arg("check").assert().failure();
    }
}

mod compile_command {
    use super::*;

    #[test]
    fn compile_mapper_statement() {
        let temp = TempDir::new().unwrap();
        let file_path = temp.path().join("users.xml");
        fs::write(&file_path, MAPPER).unwrap();

        dynsql()
            .args(["compile", "--id", "findUser", "--param", r#"{"id": 5}"#])
            .arg(&file_path)
            .assert()
            .success()
            .stdout("SELECT * FROM users WHERE id = ?\n[5]\n");
    }

    #[test]
    fn compile_with_postgres_driver() {
        let temp = TempDir::new().unwrap();
        let file_path = temp.path().join("users.xml");
        fs::write(&file_path, MAPPER).unwrap();

        dynsql()
            .args(["compile", "-i", "removeUser", "-d", "postgres", "-p", "42"])
            .arg(&file_path)
            .assert()
            .success()
            .stdout("DELETE FROM users WHERE id = $1\n[42]\n");
    }

    #[test]
    fn compile_template_statement() {
        let temp = TempDir::new().unwrap();
        let file_path = temp.path().join("users.hbs");
        fs::write(&file_path, TEMPLATES).unwrap();

        dynsql()
            .args(["compile", "--id", "countUsers", "--param", r#"{"active": true}"#])
            .arg(&file_path)
            .assert()
            .success()
            .stdout("SELECT COUNT(*) FROM users WHERE active = ?\n[true]\n");
    }

    #[test]
    fn compile_raw_sql_without_files() {
        dynsql()
            .args([
                "compile",
                "--id",
                "SELECT * FROM t WHERE id=#{id} AND name=${name}",
                "--param",
                r#"{"id": 7, "name": "bob"}"#,
            ])
            .assert()
            .success()
            .stdout("SELECT * FROM t WHERE id=? AND name=bob\n[7]\n");
    }

    #[test]
    fn compile_positional_rejects_names() {
        dynsql()
            .args([
                "compile",
                "--positional",
                "--id",
                "SELECT #{id}",
                "--param",
                r#"{"id": 1}"#,
            ])
            .assert()
            .code(1)
            .stderr(predicate::str::contains("param_addressing"));
    }

    #[test]
    fn compile_unterminated_placeholder_exits_1() {
        dynsql()
            .args(["compile", "--id", "SELECT #{id"])
            .assert()
            .code(1)
            .stderr(predicate::str::contains("parse_syntax"))
            .stderr(predicate::str::contains("line 1, column 8"));
    }

    #[test]
    fn compile_invalid_json_param_exits_2() {
        dynsql()
            .args(["compile", "--id", "SELECT 1", "--param", "{not json"])
            .assert()
            .code(2)
            .stderr(predicate::str::contains("invalid JSON parameter"));
    }
}
