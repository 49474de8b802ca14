//! Builds a filter over a synthetic key set, then checks membership and
//! range queries against it.

use diva::data_gen::generate_uniform_u64;
use diva::Diva;

fn main() {
    let keys = generate_uniform_u64(200_000, 0, 1_000_000_000);

    let mut diva = Diva::bulk_load(8, keys.clone(), true, 7, 0.95);

    let hits = keys.iter().take(1000).filter(|&&k| diva.point_query(k)).count();
    println!("point_query hit rate over 1000 inserted keys: {hits}/1000");

    let absent_but_reported = (0..1000)
        .map(|i| 1_000_000_000 + i * 7)
        .filter(|&k| diva.point_query(k))
        .count();
    println!("false positives over 1000 keys outside the dataset's range: {absent_but_reported}/1000");

    println!("range_query(0, u64::MAX) = {}", diva.range_query(0u64, u64::MAX));

    diva.insert(42_000_000_000u64).expect("insert");
    println!("point_query(42_000_000_000) after insert = {}", diva.point_query(42_000_000_000u64));

    let mut buf = Vec::new();
    diva.serialize(&mut buf);
    println!("serialized size: {} bytes", buf.len());

    let restored = Diva::deserialize(&buf).expect("deserialize");
    println!(
        "restored point_query(42_000_000_000) = {}",
        restored.point_query(42_000_000_000u64)
    );
}
