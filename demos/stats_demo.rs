use clap::Parser;
use swiss_map::HashMap;

#[derive(Parser, Debug)]
struct Args {
    #[arg(short = 'c', long = "target_capacity", default_value_t = 1000)]
    target_capacity: usize,

    /// Percentage of the inserted keys to delete afterwards.
    #[arg(short = 'd', long = "delete_percent", default_value_t = 0)]
    delete_percent: u64,
}

fn main() {
    let args = Args::parse();

    println!(
        "Creating HashMap with target capacity: {}",
        args.target_capacity
    );

    let mut map: HashMap<u64, u64> = HashMap::with_capacity(args.target_capacity);

    println!("Actual capacity: {}", map.capacity());
    println!("Filling map with u64 keys...");

    let num_values = map.capacity() as u64;
    for i in 0..num_values {
        map.put(i, i * 2);
    }

    if args.delete_percent > 0 {
        let percent = args.delete_percent.min(100);
        let deleted = (0..num_values)
            .filter(|k| k % 100 < percent)
            .filter(|k| map.delete(k))
            .count();
        println!("Deleted {} keys", deleted);
    }

    println!("Map holds {} entries", map.count());
    println!("Final load factor: {:.2}%", map.load_factor() * 100.0);

    map.print_probe_histogram();
    map.debug_stats().print();

    let first: Vec<u64> = map.keys().take(5).copied().collect();
    let second: Vec<u64> = map.keys().take(5).copied().collect();
    println!("First keys of two iterations: {:?} / {:?}", first, second);
}
