// Example: reflect a large two-level tree and scroll through it.
use std::rc::Rc;

use tree_virtualizer::{Reflector, ReflectorOptions, Size, TreeSource, ViewFactory};

/// 10_000 top-level rows, each with three leaf children.
struct Outline;

impl TreeSource<u64> for Outline {
    fn row_count(&self, parent: Option<&u64>) -> usize {
        match parent {
            None => 10_000,
            Some(k) if *k <= 10_000 => 3,
            Some(_) => 0,
        }
    }

    fn key(&self, parent: Option<&u64>, row: usize) -> Option<u64> {
        match parent {
            None => (row < 10_000).then(|| row as u64 + 1),
            Some(k) => (row < 3).then(|| 1_000_000 + *k * 10 + row as u64),
        }
    }
}

#[derive(Default)]
struct Labels {
    created: usize,
}

impl ViewFactory<u64> for Labels {
    type Handle = String;

    fn create(&mut self, key: &u64, depth: usize) -> Option<String> {
        self.created += 1;
        Some(format!("{}row {key}", "  ".repeat(depth.saturating_sub(1))))
    }

    fn bind(&mut self, handle: &mut String, key: &u64, depth: usize) {
        *handle = format!("{}row {key}", "  ".repeat(depth.saturating_sub(1)));
    }
}

fn main() {
    let options = ReflectorOptions::uniform(1)
        .with_initial_viewport(Some(Size::new(40, 8)))
        .with_buffer_size(4);
    let mut r = Reflector::new(options, Labels::default());
    r.set_source(Some(Rc::new(Outline) as Rc<dyn TreeSource<u64>>));

    println!("loaded={} created={}", r.loaded_count(), r.factory().created);
    r.for_each_visible(|it| println!("  y={} key={} depth={}", it.rect.y, it.key, it.depth));

    r.set_scroll_offset(20_000);
    println!(
        "after scroll: offset={} loaded={} extent={:?} created={}",
        r.scroll_offset(),
        r.loaded_count(),
        r.loaded_extent(),
        r.factory().created
    );
    r.for_each_visible(|it| println!("  y={} key={} depth={}", it.rect.y, it.key, it.depth));
    println!("valid={:?}", r.validate());
}
