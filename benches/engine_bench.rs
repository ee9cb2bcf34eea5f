use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use expensedb_core::{Currency, ExpenseUpdate, ExpensesRepository, NewExpense, PageRequest};
use expensedb_embedded::{derive_expense_id, EmbeddedDriver};
use rust_decimal_macros::dec;
use tempfile::TempDir;
use tokio::runtime::Runtime;

fn setup() -> (TempDir, Arc<dyn ExpensesRepository>, Runtime) {
    let dir = TempDir::new().unwrap();
    let driver = EmbeddedDriver::open(dir.path().join("bench.db")).unwrap();
    let rt = Runtime::new().unwrap();
    (dir, Arc::new(driver), rt)
}

fn expense(i: usize) -> NewExpense {
    NewExpense {
        title: format!("Expense {}", i),
        price: dec!(12.34),
        currency: Currency::Eur,
    }
}

fn seed_data(rt: &Runtime, repo: &Arc<dyn ExpensesRepository>, n: usize) {
    rt.block_on(async {
        for i in 0..n {
            repo.create(&expense(i)).await.unwrap();
        }
    });
}

fn bench_create(c: &mut Criterion) {
    let (_dir, repo, rt) = setup();
    let new = expense(0);

    c.bench_function("embedded_create", |b| {
        b.iter(|| rt.block_on(repo.create(black_box(&new))).unwrap())
    });
}

fn bench_list_page(c: &mut Criterion) {
    let (_dir, repo, rt) = setup();
    seed_data(&rt, &repo, 1_000);

    let page = PageRequest::new(50, 10).unwrap();
    c.bench_function("embedded_list_page", |b| {
        b.iter(|| rt.block_on(repo.list_expenses(black_box(page))).unwrap())
    });
}

fn bench_get_by_ids(c: &mut Criterion) {
    let (_dir, repo, rt) = setup();
    seed_data(&rt, &repo, 1_000);

    let ids: Vec<String> = (1..=1_000).step_by(50).map(derive_expense_id).collect();
    c.bench_function("embedded_get_by_ids", |b| {
        b.iter(|| rt.block_on(repo.get_by_ids(black_box(&ids))).unwrap())
    });
}

fn bench_update(c: &mut Criterion) {
    let (_dir, repo, rt) = setup();
    seed_data(&rt, &repo, 100);

    let id = derive_expense_id(42);
    let mut flip = false;
    c.bench_function("embedded_update", |b| {
        b.iter(|| {
            flip = !flip;
            let changes = ExpenseUpdate {
                price: Some(if flip { dec!(1) } else { dec!(2) }),
                ..Default::default()
            };
            rt.block_on(repo.update(black_box(&id), &changes)).unwrap()
        })
    });
}

criterion_group!(
    benches,
    bench_create,
    bench_list_page,
    bench_get_by_ids,
    bench_update
);
criterion_main!(benches);
