fn main() {
    burnin_board_lib::run()
}
