fn main() {
    // 只有固件构建需要 ESP-IDF 的环境变量
    #[cfg(feature = "esp")]
    embuild::espidf::sysenv_output();
}
