use tree_virtualizer::{Edge, ReflectorOptions, Size, ViewFactory};
use tree_virtualizer_adapter::{Controller, StoreResult, TreeStore};

struct Rows;

impl ViewFactory<u32> for Rows {
    type Handle = u32;

    fn create(&mut self, key: &u32, _depth: usize) -> Option<u32> {
        Some(*key)
    }

    fn bind(&mut self, handle: &mut u32, key: &u32, _depth: usize) {
        *handle = *key;
    }
}

fn print_visible(c: &Controller<u32, Rows>) {
    let mut rows = Vec::new();
    c.reflector().for_each_visible(|it| rows.push((it.depth, it.key)));
    println!(
        "offset={} cursor={:?} visible={rows:?}",
        c.reflector().scroll_offset(),
        c.cursor()
    );
}

fn main() -> StoreResult<()> {
    // Example: keyboard navigation over a folder-like tree.
    //
    // The cursor is tracked by key; moving it loads rows on demand and scrolls them into view.
    let store = TreeStore::flat(1..=20u32)?;
    for folder in [3u32, 7] {
        store.extend(Some(&folder), (1..=5).map(|i| folder * 100 + i))?;
    }

    let options = ReflectorOptions::uniform(1).with_initial_viewport(Some(Size::new(30, 5)));
    let mut c = Controller::new(options, Rows);
    store.attach(c.reflector_mut());

    c.move_cursor(Edge::Top)?;
    print_visible(&c);

    for _ in 0..6 {
        c.move_cursor(Edge::Bottom)?;
    }
    print_visible(&c);

    c.move_cursor(Edge::Left)?;
    print_visible(&c);

    c.page_down();
    c.page_down();
    print_visible(&c);

    // Rows inserted above the viewport push it down; an anchor keeps the same row on screen.
    let anchor = c.capture_anchor();
    store.insert_rows(c.reflector_mut(), None, 0, [900, 901, 902])?;
    if let Some(anchor) = anchor {
        let ok = c.apply_anchor(&anchor);
        println!("anchor={anchor:?} applied={ok}");
    }
    print_visible(&c);
    Ok(())
}
