use zoomap::testing::TestingServer;
use zoomap::ZooMap;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let server = TestingServer::start();
    let target = format!("{}/demo", server.connect_string());
    let map = ZooMap::builder(target)
        .with_connector(server.connector())
        .with_root("/settings")
        .build()?;

    map.insert("mode", "fast")?;
    map.insert("region", "eu-central")?;
    map.insert("flag", None)?;

    println!("connected to {} under {}", map.connect_string(), map.root());
    println!("size={}", map.len()?);
    for (key, value) in map.entries()? {
        match value {
            Some(value) => println!("{key} = {value}"),
            None => println!("{key} (null payload)"),
        }
    }

    let previous = map.remove("region")?;
    println!("removed region, previous={previous:?}");
    println!("keys left: {:?}", map.keys()?);

    map.close();
    Ok(())
}
