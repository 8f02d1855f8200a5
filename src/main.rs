#[rocket::main]
async fn main() -> Result<(), rocket::Error> {
    let _rocket = lunasentri::rocket().launch().await?;
    Ok(())
}
