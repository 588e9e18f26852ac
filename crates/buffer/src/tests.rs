use super::*;
use common::Schema;
use storage::HeapFile;
use tempfile::{TempDir, tempdir};
use types::{SqlType, Value};

// One INT column on a 20-byte page: four slots per page.
const FOUR_SLOT_PAGE: usize = 20;

fn int_schema() -> Schema {
    Schema::from_types(&[SqlType::Int], &["v"])
}

fn int_tuple(v: i32) -> Tuple {
    Tuple::new(vec![Value::Int(v)])
}

fn setup(dir: &TempDir, pages: usize) -> (Arc<Catalog>, TableId, BufferPool) {
    let catalog = Arc::new(Catalog::new());
    let file = HeapFile::open(&dir.path().join("t.dat"), int_schema(), FOUR_SLOT_PAGE).unwrap();
    let table = catalog.add_table(file, "t", None).unwrap();
    let pool = BufferPool::new(Arc::clone(&catalog), pages).unwrap();
    (catalog, table, pool)
}

fn stored_values(catalog: &Catalog, table: TableId) -> Vec<i32> {
    let file = catalog.database_file(table).unwrap();
    let mut values = Vec::new();
    for page_no in 0..file.num_pages().unwrap() {
        let page = file.read_page(PageId::new(table, page_no)).unwrap();
        values.extend(page.tuples().map(|t| t.get(0).unwrap().as_int().unwrap()));
    }
    values
}

#[test]
fn rejects_zero_capacity() {
    let err = BufferPool::new(Arc::new(Catalog::new()), 0).unwrap_err();
    assert!(matches!(err, DbError::InvalidArgument(_)));
}

#[test]
fn repeated_get_page_returns_cached_page() {
    let dir = tempdir().unwrap();
    let (_catalog, table, mut pool) = setup(&dir, 4);
    let txn = TransactionId::next();

    pool.insert_tuple(txn, table, int_tuple(1)).unwrap();
    let pid = PageId::new(table, 0);
    let page = pool.get_page(txn, pid, Permissions::ReadOnly).unwrap();
    assert_eq!(page.num_occupied_slots(), 1);
    assert_eq!(pool.num_cached_pages(), 1);
    assert!(pool.is_dirty(pid));
}

#[test]
fn unknown_table_is_catalog_error() {
    let dir = tempdir().unwrap();
    let (_catalog, _table, mut pool) = setup(&dir, 4);
    let err = pool
        .get_page(
            TransactionId::next(),
            PageId::new(TableId(9), 0),
            Permissions::ReadOnly,
        )
        .unwrap_err();
    assert!(matches!(err, DbError::Catalog(_)));
}

#[test]
fn commit_flushes_pages_to_disk() {
    let dir = tempdir().unwrap();
    let (catalog, table, mut pool) = setup(&dir, 4);
    let txn = TransactionId::next();

    for v in 0..6 {
        pool.insert_tuple(txn, table, int_tuple(v)).unwrap();
    }
    // Appended pages hit disk empty; contents wait for the flush.
    assert!(stored_values(&catalog, table).is_empty());

    pool.transaction_complete(txn, true).unwrap();
    assert_eq!(stored_values(&catalog, table), vec![0, 1, 2, 3, 4, 5]);
    assert!(!pool.is_dirty(PageId::new(table, 0)));
}

#[test]
fn abort_discards_dirty_pages() {
    let dir = tempdir().unwrap();
    let (_catalog, table, mut pool) = setup(&dir, 4);
    let committed = TransactionId::next();
    pool.insert_tuple(committed, table, int_tuple(1)).unwrap();
    pool.transaction_complete(committed, true).unwrap();

    let aborted = TransactionId::next();
    pool.insert_tuple(aborted, table, int_tuple(2)).unwrap();
    pool.transaction_complete(aborted, false).unwrap();

    let pid = PageId::new(table, 0);
    assert!(!pool.holds_page(pid));
    let page = pool
        .get_page(TransactionId::next(), pid, Permissions::ReadOnly)
        .unwrap();
    assert_eq!(page.num_occupied_slots(), 1);
}

#[test]
fn evicts_least_recently_used_clean_page() {
    let dir = tempdir().unwrap();
    let (_catalog, table, mut pool) = setup(&dir, 2);
    let txn = TransactionId::next();
    for v in 0..12 {
        pool.insert_tuple(txn, table, int_tuple(v)).unwrap();
        pool.flush_all_pages().unwrap();
    }

    let (p0, p1, p2) = (
        PageId::new(table, 0),
        PageId::new(table, 1),
        PageId::new(table, 2),
    );
    pool.get_page(txn, p0, Permissions::ReadOnly).unwrap();
    pool.get_page(txn, p1, Permissions::ReadOnly).unwrap();
    pool.get_page(txn, p0, Permissions::ReadOnly).unwrap();
    pool.get_page(txn, p2, Permissions::ReadOnly).unwrap();

    assert!(pool.holds_page(p0));
    assert!(!pool.holds_page(p1));
    assert!(pool.holds_page(p2));
    assert_eq!(pool.num_cached_pages(), 2);
}

#[test]
fn all_dirty_pool_refuses_to_evict() {
    let dir = tempdir().unwrap();
    let (_catalog, table, mut pool) = setup(&dir, 1);
    let txn = TransactionId::next();

    for v in 0..4 {
        pool.insert_tuple(txn, table, int_tuple(v)).unwrap();
    }
    let err = pool.insert_tuple(txn, table, int_tuple(4)).unwrap_err();
    assert!(matches!(err, DbError::Storage(_)));
}

#[test]
fn delete_tuple_frees_slot() {
    let dir = tempdir().unwrap();
    let (catalog, table, mut pool) = setup(&dir, 4);
    let txn = TransactionId::next();
    pool.insert_tuple(txn, table, int_tuple(7)).unwrap();
    pool.insert_tuple(txn, table, int_tuple(8)).unwrap();

    let pid = PageId::new(table, 0);
    let victim = pool
        .get_page(txn, pid, Permissions::ReadOnly)
        .unwrap()
        .tuple(0)
        .cloned()
        .unwrap();
    pool.delete_tuple(txn, &victim).unwrap();
    pool.transaction_complete(txn, true).unwrap();

    assert_eq!(stored_values(&catalog, table), vec![8]);
}

#[test]
fn delete_without_record_id_fails() {
    let dir = tempdir().unwrap();
    let (_catalog, _table, mut pool) = setup(&dir, 4);
    let err = pool
        .delete_tuple(TransactionId::next(), &int_tuple(1))
        .unwrap_err();
    assert!(matches!(err, DbError::Storage(_)));
}

#[test]
fn discard_page_drops_uncommitted_changes() {
    let dir = tempdir().unwrap();
    let (catalog, table, mut pool) = setup(&dir, 4);
    let txn = TransactionId::next();
    pool.insert_tuple(txn, table, int_tuple(3)).unwrap();

    pool.discard_page(PageId::new(table, 0));
    pool.flush_all_pages().unwrap();
    assert!(stored_values(&catalog, table).is_empty());
}

#[test]
fn second_writer_on_dirty_page_is_refused() {
    let dir = tempdir().unwrap();
    let (catalog, table, mut pool) = setup(&dir, 4);
    let first = TransactionId::next();
    let second = TransactionId::next();

    pool.insert_tuple(first, table, int_tuple(1)).unwrap();
    let err = pool.insert_tuple(second, table, int_tuple(2)).unwrap_err();
    assert!(matches!(err, DbError::Storage(_)));

    // Reads are still allowed.
    let pid = PageId::new(table, 0);
    pool.get_page(second, pid, Permissions::ReadOnly).unwrap();

    pool.transaction_complete(first, true).unwrap();
    pool.transaction_complete(second, false).unwrap();
    assert_eq!(stored_values(&catalog, table), vec![1]);

    // Once the owner has committed the page is free to write again.
    let third = TransactionId::next();
    pool.insert_tuple(third, table, int_tuple(3)).unwrap();
    pool.transaction_complete(third, true).unwrap();
    assert_eq!(stored_values(&catalog, table), vec![1, 3]);
}

#[test]
fn abort_after_refused_write_keeps_committed_rows() {
    let dir = tempdir().unwrap();
    let (catalog, table, mut pool) = setup(&dir, 4);
    let first = TransactionId::next();
    let second = TransactionId::next();

    pool.insert_tuple(first, table, int_tuple(1)).unwrap();
    assert!(pool.insert_tuple(second, table, int_tuple(2)).is_err());
    pool.transaction_complete(second, false).unwrap();
    assert!(pool.is_dirty(PageId::new(table, 0)));

    pool.transaction_complete(first, true).unwrap();
    assert_eq!(stored_values(&catalog, table), vec![1]);
}
