mod relay {
    pub mod helpers;
    mod link;
    mod session;
}
