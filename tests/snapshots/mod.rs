//! Snapshot tests using insta
//!
//! These tests compile whole mapper and template documents and snapshot the
//! prepared SQL next to its bind values.

use dynsql::{Config, Param, Registry};
use insta::assert_snapshot;

const ORDERS_MAPPER: &str = r#"
<mapper namespace="orders">
  <sql id="orderColumns">o.id, o.total, o.status</sql>

  <select id="searchOrders">
    SELECT <include refid="orderColumns"/>, c.name
    FROM orders o
    JOIN customers c ON c.id = o.customer_id
    <where>
      <if test="status">AND o.status = #{status}</if>
      <if test="minTotal">AND o.total >= #{minTotal}</if>
      <if test="customer">OR c.name = #{customer}</if>
    </where>
    ORDER BY ${orderBy}
  </select>

  <update id="updateOrder">
    UPDATE orders
    <set>
      <if test="status">status = #{status},</if>
      <if test="total">total = #{total},</if>
    </set>
    WHERE id = #{id}
  </update>

  <insert id="insertOrder">
    INSERT INTO orders (customer_id, total, note)
    VALUES (#{customer_id}, #{total}, 'keep   this   spacing')
  </insert>
</mapper>
"#;

const ORDERS_TEMPLATES: &str = r#"
{{#*inline "orderPage"}}
  SELECT * FROM orders
  {{where "AND status =" (arg status) "AND region =" region}}
  LIMIT {{arg size}} OFFSET {{add offset size}}
{{/inline}}

{{#*inline "touchOrder"}}
  UPDATE orders
  {{#set}}
    {{#if status}}status = {{arg status}},{{/if}}
    updated_at = NOW(),
  {{/set}}
  WHERE id = {{arg id}}
{{/inline}}
"#;

/// Compile a statement and render it as `sql` followed by its JSON params
fn snapshot_compile(driver: &str, id: &str, params: serde_json::Value) -> String {
    let registry = Registry::new(Config::new().driver(driver));
    registry.register_mapper(ORDERS_MAPPER).unwrap();
    registry.register_templates(ORDERS_TEMPLATES).unwrap();

    match registry.compile(id, &[Param::json(params)]) {
        Ok(meta) => {
            let values: Vec<serde_json::Value> = meta.params.iter().map(|v| v.to_json()).collect();
            format!("{} | {}", meta.prepare_sql, serde_json::Value::Array(values))
        }
        Err(e) => format!("ERROR[{}]: {}", e.code(), e),
    }
}

// =============================================================================
// Mapper Snapshots
// =============================================================================

#[test]
fn snapshot_search_all_filters() {
    let out = snapshot_compile(
        "mysql",
        "searchOrders",
        serde_json::json!({"status": "open", "minTotal": 100, "customer": "ann", "orderBy": "o.id DESC"}),
    );
    assert_snapshot!(out, @r#"SELECT o.id, o.total, o.status, c.name FROM orders o JOIN customers c ON c.id = o.customer_id WHERE o.status = ? AND o.total >= ? OR c.name = ? ORDER BY o.id DESC | ["open",100,"ann"]"#);
}

#[test]
fn snapshot_search_strips_leading_or() {
    let out = snapshot_compile(
        "postgres",
        "searchOrders",
        serde_json::json!({"customer": "ann", "orderBy": "o.total"}),
    );
    assert_snapshot!(out, @r#"SELECT o.id, o.total, o.status, c.name FROM orders o JOIN customers c ON c.id = o.customer_id WHERE c.name = $1 ORDER BY o.total | ["ann"]"#);
}

#[test]
fn snapshot_search_no_filters() {
    let out = snapshot_compile("mysql", "searchOrders", serde_json::json!({"orderBy": "o.id"}));
    assert_snapshot!(out, @"SELECT o.id, o.total, o.status, c.name FROM orders o JOIN customers c ON c.id = o.customer_id ORDER BY o.id | []");
}

#[test]
fn snapshot_search_missing_literal() {
    let out = snapshot_compile("mysql", "searchOrders", serde_json::json!({"status": "open"}));
    assert_snapshot!(out, @"ERROR[param_resolution]: Parameter error: no parameter named 'orderBy'");
}

#[test]
fn snapshot_update_set() {
    let out = snapshot_compile(
        "postgres",
        "updateOrder",
        serde_json::json!({"id": 9, "status": "shipped", "total": 12.5}),
    );
    assert_snapshot!(out, @r#"UPDATE orders SET status = $1, total = $2 WHERE id = $3 | ["shipped",12.5,9]"#);
}

#[test]
fn snapshot_insert_keeps_literal_spacing() {
    let out = snapshot_compile(
        "sqlite",
        "insertOrder",
        serde_json::json!({"customer_id": 4, "total": 30}),
    );
    assert_snapshot!(out, @"INSERT INTO orders (customer_id, total, note) VALUES (?, ?, 'keep   this   spacing') | [4,30]");
}

// =============================================================================
// Template Snapshots
// =============================================================================

#[test]
fn snapshot_template_inline_where() {
    let out = snapshot_compile(
        "mysql",
        "orderPage",
        serde_json::json!({"status": "open", "region": "eu", "size": 20, "offset": 40}),
    );
    assert_snapshot!(out, @r#"SELECT * FROM orders WHERE status = ? AND region = 'eu' LIMIT ? OFFSET 60 | ["open",20]"#);
}

#[test]
fn snapshot_template_drops_empty_pairs() {
    let out = snapshot_compile(
        "postgres",
        "orderPage",
        serde_json::json!({"size": 10, "offset": 0}),
    );
    assert_snapshot!(out, @"SELECT * FROM orders LIMIT $1 OFFSET 10 | [10]");
}

#[test]
fn snapshot_template_block_set() {
    let out = snapshot_compile(
        "mysql",
        "touchOrder",
        serde_json::json!({"id": 3, "status": "closed"}),
    );
    assert_snapshot!(out, @r#"UPDATE orders SET status = ?, updated_at = NOW() WHERE id = ? | ["closed",3]"#);
}

#[test]
fn snapshot_template_block_set_without_status() {
    let out = snapshot_compile("mysql", "touchOrder", serde_json::json!({"id": 3}));
    assert_snapshot!(out, @"UPDATE orders SET updated_at = NOW() WHERE id = ? | [3]");
}
