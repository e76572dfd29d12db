#[path = "../src/tokenize.rs"]
mod tokenize;
#[path = "../src/tree.rs"]
mod tree;

use tree::{build_tree, TreeLimits};

fn main() {
    divan::main();
}

fn make_lines(len: usize) -> Vec<String> {
    (0..len)
        .map(|idx| {
            let level = match idx % 3 {
                0 => "error",
                1 => "warn",
                _ => "info",
            };
            format!(
                "2017/04/25 11:22:33 {level} module{:02} request {} finished in {}ms",
                idx % 16,
                idx % 200,
                idx % 90
            )
        })
        .collect()
}

#[divan::bench(args = [100usize, 1000usize, 10000usize])]
fn tokenize_lines(bencher: divan::Bencher, len: usize) {
    let lines = make_lines(len);
    bencher.counter(len).bench(|| {
        let tokens: usize = lines.iter().map(|line| tokenize::tokenize(line).len()).sum();
        divan::black_box(tokens);
    });
}

#[divan::bench(args = [100usize, 1000usize, 10000usize])]
fn build_tree_batch(bencher: divan::Bencher, len: usize) {
    let lines = make_lines(len);
    bencher.counter(len).bench(|| {
        let built = build_tree(lines.clone(), &TreeLimits::default());
        divan::black_box(built.node_count());
    });
}

#[divan::bench(args = [1000usize, 10000usize])]
fn dump_tree(bencher: divan::Bencher, len: usize) {
    let built = build_tree(make_lines(len), &TreeLimits::default());
    bencher.bench(|| {
        divan::black_box(built.dump().len());
    });
}
