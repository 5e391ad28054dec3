//! The process-wide library catalog is built once and shared.

use widgetlab_core::catalog::{catalog_load_count, library_catalog};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_callers_share_one_load() {
    let handles: Vec<_> = (0..8).map(|_| tokio::spawn(library_catalog())).collect();

    let mut first = None;
    for handle in handles {
        let catalog = handle.await.unwrap().unwrap();
        let first = first.get_or_insert(catalog);
        assert!(std::ptr::eq(*first, catalog));
    }

    let again = library_catalog().await.unwrap();
    assert!(again.exports("recharts").is_some_and(|names| !names.is_empty()));
    assert_eq!(catalog_load_count(), 1);
}
