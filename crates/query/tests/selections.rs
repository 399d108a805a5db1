// Copyright (C) 2025 Ryan Daum <ryan.daum@gmail.com> This program is free
// software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, version
// 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

use memrel_db::{
    ColumnDef, Database, Error, Expr, IndexDef, OnConflict, Row, RowId, Session, TableSchema,
    Transaction, col, lit,
};
use memrel_query::{
    BuildContext, ColumnInfo, InsertSource, Mutation, OrderKey, Plan, RowStream, Selection,
    SelectionExt, collect_rows, scan,
};
use memrel_var::{DataType, Value, v_int, v_null, v_text};
use pretty_assertions::assert_eq;
use std::collections::BTreeSet;
use std::sync::Arc;
use test_case::test_case;

/// `t(a int indexed, b int, s text indexed, u text)`, with `b` and `u` mirroring `a` and `s`.
fn mirrored(t: &Transaction) -> Database {
    let mut db = Database::default();
    db.declare_table(
        t,
        TableSchema::new("t")
            .column(ColumnDef::new("a", DataType::Int))
            .column(ColumnDef::new("b", DataType::Int))
            .column(ColumnDef::new("s", DataType::Text))
            .column(ColumnDef::new("u", DataType::Text)),
    )
    .unwrap();
    db.create_index(t, "t", IndexDef::on(col(0)).named("t_a_idx"))
        .unwrap();
    db.create_index(t, "t", IndexDef::on(col(2)).named("t_s_idx"))
        .unwrap();
    let ints = [Some(1), Some(2), Some(3), Some(3), Some(4), Some(5), None, None, Some(2)];
    let texts = [
        Some("apple"),
        Some("banana"),
        Some("berry"),
        None,
        Some("bz"),
        Some("c"),
        Some("b"),
        Some(""),
        None,
    ];
    let rows = ints
        .iter()
        .zip(texts)
        .map(|(i, s)| {
            let i = i.map(v_int).unwrap_or(v_null());
            let s = s.map(v_text).unwrap_or(v_null());
            vec![i.clone(), i, s.clone(), s]
        })
        .collect();
    db.insert_rows(t, "t", rows).unwrap();
    db
}

fn ids(selection: &Arc<dyn Selection>, t: &Transaction) -> BTreeSet<RowId> {
    collect_rows(selection.as_ref(), t)
        .unwrap()
        .into_iter()
        .map(|r| r.id)
        .collect()
}

fn column_values(selection: &Arc<dyn Selection>, t: &Transaction, column: usize) -> Vec<Value> {
    collect_rows(selection.as_ref(), t)
        .unwrap()
        .into_iter()
        .map(|r| r.values[column].clone())
        .collect()
}

fn uses(plan: &Plan, operator: &str) -> bool {
    plan.find(operator).is_some()
}

#[test_case(|c| c.equals(lit(3)) ; "eq")]
#[test_case(|c| c.not_equals(lit(3)) ; "neq")]
#[test_case(|c| c.gt(lit(3)) ; "gt")]
#[test_case(|c| c.ge(lit(3)) ; "ge")]
#[test_case(|c| c.lt(lit(3)) ; "lt")]
#[test_case(|c| c.le(lit(3)) ; "le")]
#[test_case(|c| lit(3).lt(c) ; "flipped gt")]
#[test_case(|c| c.between(lit(2), lit(4)) ; "between")]
#[test_case(|c| c.in_list(vec![lit(1), lit(3), lit(v_null())], false) ; "in with null")]
#[test_case(|c| c.in_list(vec![lit(1), lit(3)], true) ; "not in")]
#[test_case(|c| c.in_list(vec![lit(1), lit(v_null())], true) ; "not in with null")]
#[test_case(|c| c.equals(lit(v_null())) ; "eq null")]
#[test_case(|c| c.is_null() ; "is null")]
#[test_case(|c| c.is_not_null() ; "is not null")]
#[test_case(|c| c.equals(lit(2.0)) ; "eq float probe")]
fn test_index_and_sequential_filters_agree(predicate: fn(Expr) -> Expr) {
    let t = Transaction::root();
    let db = mirrored(&t);
    let ctx = BuildContext::new(&db);
    let source = scan(&db, "t").unwrap();
    let indexed = source.filter(&ctx, predicate(col(0))).unwrap();
    let sequential = source.filter(&ctx, predicate(col(1))).unwrap();
    assert!(!uses(&sequential.explain(&t), "IndexFilter"));
    assert_eq!(ids(&indexed, &t), ids(&sequential, &t));
}

#[test_case(|c| c.like(lit("b%")) ; "prefix")]
#[test_case(|c| c.like(lit("%")) ; "match all")]
#[test_case(|c| c.equals(lit("berry")) ; "eq")]
#[test_case(|c| c.gt(lit("b")) ; "gt")]
#[test_case(|c| c.not_equals(lit("")) ; "neq empty")]
fn test_text_index_and_sequential_filters_agree(predicate: fn(Expr) -> Expr) {
    let t = Transaction::root();
    let db = mirrored(&t);
    let ctx = BuildContext::new(&db);
    let source = scan(&db, "t").unwrap();
    let indexed = source.filter(&ctx, predicate(col(2))).unwrap();
    let sequential = source.filter(&ctx, predicate(col(3))).unwrap();
    assert!(uses(&indexed.explain(&t), "IndexFilter"));
    assert_eq!(ids(&indexed, &t), ids(&sequential, &t));
}

#[test]
fn test_filter_strategies() {
    let t = Transaction::root();
    let db = mirrored(&t);
    let ctx = BuildContext::new(&db);
    let source = scan(&db, "t").unwrap();

    let eq = source.filter(&ctx, col(0).equals(lit(3))).unwrap();
    assert_eq!(eq.explain(&t).operator, "IndexFilter");
    assert_eq!(eq.entropy(&t), 2.0);

    let seq = source.filter(&ctx, col(1).equals(lit(3))).unwrap();
    assert_eq!(seq.explain(&t).operator, "SeqFilter");
    assert_eq!(seq.entropy(&t), 9.0 * 1.5);

    let never = source.filter(&ctx, col(0).equals(lit(v_null()))).unwrap();
    assert_eq!(never.explain(&t).operator, "FalseFilter");

    let always = source.filter(&ctx, lit(1).equals(lit(1))).unwrap();
    assert_eq!(always.explain(&t).operator, "Scan");
}

#[test]
fn test_and_drives_cheapest_child() {
    let t = Transaction::root();
    let db = mirrored(&t);
    let ctx = BuildContext::new(&db);
    let source = scan(&db, "t").unwrap();
    let filter = source
        .filter(
            &ctx,
            col(1)
                .gt(lit(1))
                .and(col(0).equals(lit(3)))
                .and(col(2).equals(lit("berry"))),
        )
        .unwrap();
    let plan = filter.explain(&t);
    assert_eq!(plan.operator, "And");
    // Two indexed terms plus one sequential remainder, cheapest first.
    assert_eq!(plan.children.len(), 3);
    assert_eq!(plan.children[0].operator, "IndexFilter");
    assert!(plan.children[0].detail.contains("t_s_idx"));
    assert!(plan.children[1].detail.contains("t_a_idx"));
    assert_eq!(plan.children[2].operator, "SeqFilter");
    assert_eq!(column_values(&filter, &t, 0), vec![v_int(3)]);
}

#[test]
fn test_and_strategy_is_chosen_per_transaction() {
    let root = Transaction::root();
    let db = mirrored(&root);
    let ctx = BuildContext::new(&db);
    let filter = scan(&db, "t")
        .unwrap()
        .filter(&ctx, col(0).equals(lit(2)).and(col(2).equals(lit("banana"))))
        .unwrap();
    assert!(filter.explain(&root).children[0].detail.contains("t_s_idx"));

    // Make `s = 'banana'` the expensive side, in a child transaction only.
    let child = root.fork();
    let table = db.get_table("t").unwrap();
    for _ in 0..10 {
        table
            .insert_values(&child, vec![v_int(7), v_int(7), v_text("banana"), v_text("banana")])
            .unwrap();
    }
    assert!(filter.explain(&child).children[0].detail.contains("t_a_idx"));
    assert!(filter.explain(&root).children[0].detail.contains("t_s_idx"));
    assert_eq!(ids(&filter, &child), ids(&filter, &root));
    assert_eq!(ids(&filter, &root).len(), 1);
}

#[test]
fn test_or_filters() {
    let t = Transaction::root();
    let db = mirrored(&t);
    let ctx = BuildContext::new(&db);
    let source = scan(&db, "t").unwrap();

    // Overlapping branches yield each row once.
    let both = source
        .filter(&ctx, col(0).le(lit(2)).or(col(0).equals(lit(2))))
        .unwrap();
    assert_eq!(both.explain(&t).operator, "Or");
    let mut values = column_values(&both, &t, 0);
    values.sort();
    assert_eq!(values, vec![v_int(1), v_int(2), v_int(2)]);

    // One unindexed branch turns the whole disjunction sequential.
    let mixed = source
        .filter(&ctx, col(0).equals(lit(1)).or(col(1).equals(lit(5))))
        .unwrap();
    assert_eq!(mixed.explain(&t).operator, "SeqFilter");
    let mut values = column_values(&mixed, &t, 0);
    values.sort();
    assert_eq!(values, vec![v_int(1), v_int(5)]);
}

#[test]
fn test_index_survives_projection() {
    let t = Transaction::root();
    let db = mirrored(&t);
    let ctx = BuildContext::new(&db);
    let projected = scan(&db, "t")
        .unwrap()
        .select(vec![(col(2), "name"), (col(0), "n")])
        .unwrap();
    assert_eq!(
        projected.columns()[1],
        ColumnInfo::new("n", Some("t"), DataType::Int)
    );
    let filtered = projected
        .filter(&ctx, projected.column("n").unwrap().equals(lit(3)))
        .unwrap();
    assert_eq!(filtered.explain(&t).operator, "IndexFilter");
    let rows: Vec<Vec<Value>> = collect_rows(filtered.as_ref(), &t)
        .unwrap()
        .iter()
        .map(Row::to_vec)
        .collect();
    assert_eq!(
        rows,
        vec![vec![v_text("berry"), v_int(3)], vec![v_null(), v_int(3)]]
    );
}

#[test]
fn test_projected_rows_get_derived_identities() {
    let t = Transaction::root();
    let db = mirrored(&t);
    let ctx = BuildContext::new(&db);
    let source = scan(&db, "t").unwrap();
    let source_ids = ids(&source, &t);

    let projected = source.select(vec![(col(0), "n")]).unwrap();
    let projected_ids = ids(&projected, &t);
    assert_eq!(projected_ids.len(), source_ids.len());
    assert!(projected_ids.is_disjoint(&source_ids));
    let expected: BTreeSet<RowId> = source_ids.iter().map(|id| id.derived("p")).collect();
    assert_eq!(projected_ids, expected);

    // Index lookups through the projection hand out the same identities as a scan does.
    let probed = projected.filter(&ctx, col(0).equals(lit(3))).unwrap();
    assert!(uses(&probed.explain(&t), "IndexFilter"));
    assert!(ids(&probed, &t).is_subset(&projected_ids));

    // Plain aliasing keeps identities.
    assert_eq!(ids(&source.alias("x"), &t), source_ids);
}

#[test]
fn test_index_survives_filtering() {
    let t = Transaction::root();
    let db = mirrored(&t);
    let ctx = BuildContext::new(&db);
    let filtered = scan(&db, "t")
        .unwrap()
        .filter(&ctx, col(2).like(lit("%y")))
        .unwrap()
        .filter(&ctx, col(0).equals(lit(3)))
        .unwrap();
    let plan = filtered.explain(&t);
    assert_eq!(plan.operator, "IndexFilter");
    assert!(plan.detail.contains("where"));
    assert_eq!(column_values(&filtered, &t, 2), vec![v_text("berry")]);
}

#[test]
fn test_column_resolution() {
    let t = Transaction::root();
    let db = mirrored(&t);
    let source = scan(&db, "t").unwrap();
    assert_eq!(source.column("t.b").unwrap(), col(1));
    assert_eq!(source.column("s").unwrap(), col(2));
    assert!(matches!(source.column("zz"), Err(Error::NotFound { .. })));
    let aliased = source.alias("x");
    assert_eq!(aliased.column("x.a").unwrap(), col(0));
    assert!(aliased.column("t.a").is_err());
}

#[test]
fn test_order_by_null_placement() {
    let t = Transaction::root();
    let db = mirrored(&t);
    let source = scan(&db, "t").unwrap();
    let desc = source.order_by(vec![OrderKey::desc(col(0))]).unwrap();
    assert_eq!(
        column_values(&desc, &t, 0),
        vec![
            v_null(),
            v_null(),
            v_int(5),
            v_int(4),
            v_int(3),
            v_int(3),
            v_int(2),
            v_int(2),
            v_int(1)
        ]
    );
    let asc_nulls_first = source
        .order_by(vec![OrderKey::asc(col(0)).nulls_last(false), OrderKey::asc(col(2))])
        .unwrap();
    assert_eq!(
        column_values(&asc_nulls_first, &t, 2)[..4].to_vec(),
        vec![v_text(""), v_text("b"), v_text("apple"), v_text("banana")]
    );
}

#[test]
fn test_limit_and_offset() {
    let t = Transaction::root();
    let db = mirrored(&t);
    let ordered = scan(&db, "t")
        .unwrap()
        .order_by(vec![OrderKey::asc(col(0))])
        .unwrap();
    let page = ordered.limit(Some(3), 2).unwrap();
    assert_eq!(column_values(&page, &t, 0), vec![v_int(2), v_int(3), v_int(3)]);
    let tail = ordered.limit(None, 7).unwrap();
    assert_eq!(column_values(&tail, &t, 0), vec![v_null(), v_null()]);
    assert!(matches!(ordered.limit(Some(1), -1), Err(Error::InvalidQuery(_))));
}

/// Fails the test if anything enumerates it.
#[derive(Debug)]
struct Untouchable(Vec<ColumnInfo>);

impl Selection for Untouchable {
    fn columns(&self) -> &[ColumnInfo] {
        &self.0
    }

    fn enumerate<'a>(&'a self, _t: &'a Transaction) -> RowStream<'a> {
        panic!("source must not be enumerated")
    }

    fn entropy(&self, _t: &Transaction) -> f64 {
        1.0
    }

    fn explain(&self, _t: &Transaction) -> Plan {
        Plan::new("Untouchable", "", 1.0)
    }
}

#[test_case(0 ; "zero")]
#[test_case(-5 ; "negative")]
fn test_non_positive_limit_never_touches_source(limit: i64) {
    let t = Transaction::root();
    let source: Arc<dyn Selection> = Arc::new(Untouchable(vec![ColumnInfo::new(
        "x",
        None,
        DataType::Int,
    )]));
    let limited = source.limit(Some(limit), 0).unwrap();
    assert!(collect_rows(limited.as_ref(), &t).unwrap().is_empty());
}

#[test]
fn test_distinct() {
    let t = Transaction::root();
    let db = mirrored(&t);
    let source = scan(&db, "t").unwrap();
    let distinct = source.select_columns(&["a"]).unwrap().distinct(None).unwrap();
    let mut values = column_values(&distinct, &t, 0);
    values.sort();
    assert_eq!(
        values,
        vec![v_null(), v_int(1), v_int(2), v_int(3), v_int(4), v_int(5)]
    );
    let distinct_on = source.distinct(Some(vec![col(0)])).unwrap();
    assert_eq!(collect_rows(distinct_on.as_ref(), &t).unwrap().len(), 6);
}

#[test]
fn test_union() {
    let t = Transaction::root();
    let db = mirrored(&t);
    let ctx = BuildContext::new(&db);
    let a = scan(&db, "t").unwrap().select_columns(&["a"]).unwrap();
    let low = a.filter(&ctx, col(0).le(lit(2))).unwrap();
    let high = a.filter(&ctx, col(0).ge(lit(2))).unwrap();
    let union = low.union(high.clone(), false).unwrap();
    let mut values = column_values(&union, &t, 0);
    values.sort();
    assert_eq!(values, vec![v_int(1), v_int(2), v_int(3), v_int(4), v_int(5)]);
    let union_all = low.union(high, true).unwrap();
    assert_eq!(collect_rows(union_all.as_ref(), &t).unwrap().len(), 9);
    // Rows with a = 2 come out of both branches, each under its own identity.
    assert_eq!(ids(&union_all, &t).len(), 9);

    let wide = scan(&db, "t").unwrap();
    assert!(matches!(low.union(wide, false), Err(Error::InvalidQuery(_))));
}

fn mutation_session() -> Session {
    let mut session = Session::new(Database::default());
    session
        .ddl(|db, t| {
            db.declare_table(
                t,
                TableSchema::new("m")
                    .column(ColumnDef::new("id", DataType::Int).serial().primary_key())
                    .column(ColumnDef::new("v", DataType::Int)),
            )
        })
        .unwrap();
    session
}

fn m_values(session: &mut Session) -> Vec<Value> {
    let mut values = session
        .execute(|db, t| Ok(db.get_table("m")?.scan(t).map(|r| r.values[1].clone()).collect::<Vec<_>>()))
        .unwrap();
    values.sort();
    values
}

#[test]
fn test_insert_runs_once_per_statement() {
    let mut session = mutation_session();
    let (first, second, count) = session
        .execute(|db, t| {
            let ctx = BuildContext::new(db);
            let table = db.get_table("m")?;
            let insert: Arc<dyn Selection> = Arc::new(Mutation::insert(
                &ctx,
                table.clone(),
                &["v"],
                InsertSource::Values(vec![vec![Some(lit(10))], vec![Some(lit(20))]]),
                OnConflict::Error,
            )?);
            let first = collect_rows(insert.as_ref(), t)?;
            let second = collect_rows(insert.as_ref(), t)?;
            Ok((first, second, table.len(t)))
        })
        .unwrap();
    assert_eq!(first, second);
    assert_eq!(count, 2);
    assert_eq!(
        first.iter().map(|r| r.values[1].clone()).collect::<Vec<_>>(),
        vec![v_int(10), v_int(20)]
    );
    assert_ne!(first[0].values[0], first[1].values[0]);
}

#[test]
fn test_returning_projection_and_affected_count() {
    let mut session = mutation_session();
    let returned = session
        .execute(|db, t| {
            let ctx = BuildContext::new(db);
            let insert = Mutation::insert(
                &ctx,
                db.get_table("m")?,
                &["v"],
                InsertSource::Values(vec![vec![Some(lit(1))], vec![Some(lit(2))], vec![None]]),
                OnConflict::Error,
            )?;
            assert_eq!(insert.affected(t)?, 3);
            let insert: Arc<dyn Selection> = Arc::new(insert);
            let returning = insert.select(vec![(col(1), "v")])?;
            collect_rows(returning.as_ref(), t)
        })
        .unwrap();
    let values: Vec<Value> = returned.iter().map(|r| r.values[0].clone()).collect();
    assert_eq!(values, vec![v_int(1), v_int(2), v_null()]);
    assert_eq!(m_values(&mut session).len(), 3);
}

#[test]
fn test_update_and_delete_through_filters() {
    let mut session = mutation_session();
    session
        .execute(|db, t| db.insert_rows(t, "m", vec![vec![v_int(100), v_int(10)], vec![v_int(101), v_int(20)]]))
        .unwrap();

    let updated = session
        .execute(|db, t| {
            let ctx = BuildContext::new(db);
            let table = db.get_table("m")?;
            let target = scan(db, "m")?.filter(&ctx, col(1).gt(lit(15)))?;
            let update = Mutation::update(
                &ctx,
                table,
                target,
                vec![(1, Expr::binary(memrel_db::BinaryOp::Add, col(1), lit(1)))],
            )?;
            update.affected(t)
        })
        .unwrap();
    assert_eq!(updated, 1);
    assert_eq!(m_values(&mut session), vec![v_int(10), v_int(21)]);

    let deleted = session
        .execute(|db, t| {
            let ctx = BuildContext::new(db);
            let target = scan(db, "m")?.filter(&ctx, col(1).equals(lit(10)))?;
            let delete: Arc<dyn Selection> =
                Arc::new(Mutation::delete(&ctx, db.get_table("m")?, target)?);
            collect_rows(delete.as_ref(), t)
        })
        .unwrap();
    assert_eq!(deleted.len(), 1);
    assert_eq!(deleted[0].values[1], v_int(10));
    assert_eq!(m_values(&mut session), vec![v_int(21)]);
}

#[test]
fn test_insert_from_query() {
    let mut session = mutation_session();
    session
        .execute(|db, t| db.insert_rows(t, "m", vec![vec![v_int(100), v_int(5)], vec![v_int(101), v_int(6)]]))
        .unwrap();
    let inserted = session
        .execute(|db, t| {
            let ctx = BuildContext::new(db);
            let doubled = scan(db, "m")?.select(vec![(
                Expr::binary(memrel_db::BinaryOp::Mul, col(1), lit(2)),
                "v",
            )])?;
            let insert = Mutation::insert(
                &ctx,
                db.get_table("m")?,
                &["v"],
                InsertSource::Query(doubled),
                OnConflict::Error,
            )?;
            insert.affected(t)
        })
        .unwrap();
    assert_eq!(inserted, 2);
    assert_eq!(
        m_values(&mut session),
        vec![v_int(5), v_int(6), v_int(10), v_int(12)]
    );
}

#[test]
fn test_failed_mutation_rolls_back_statement() {
    let mut session = mutation_session();
    session
        .execute(|db, t| db.insert_rows(t, "m", vec![vec![v_int(1), v_int(5)]]))
        .unwrap();
    let err = session
        .execute(|db, t| {
            let ctx = BuildContext::new(db);
            let insert = Mutation::insert(
                &ctx,
                db.get_table("m")?,
                &[],
                InsertSource::Values(vec![
                    vec![Some(lit(2)), Some(lit(6))],
                    vec![Some(lit(1)), Some(lit(7))],
                ]),
                OnConflict::Error,
            )?;
            insert.affected(t)
        })
        .unwrap_err();
    assert!(matches!(err, Error::ConstraintViolation(_)));
    assert_eq!(m_values(&mut session), vec![v_int(5)]);
}

#[test]
fn test_insert_arity_is_checked_at_build() {
    let t = Transaction::root();
    let db = mirrored(&t);
    let ctx = BuildContext::new(&db);
    let err = Mutation::insert(
        &ctx,
        db.get_table("t").unwrap(),
        &["a", "b"],
        InsertSource::Values(vec![vec![Some(lit(1))]]),
        OnConflict::Error,
    )
    .unwrap_err();
    assert!(matches!(err, Error::InvalidQuery(_)));
}
